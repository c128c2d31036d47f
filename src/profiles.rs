//! Profiles: named workspaces mapping logical roles to folder paths.
//!
//! A role ("target", "control", "archive", ...) binds to exactly one path
//! per profile. Paths need not exist when the profile is configured; the
//! commit executor checks existence at execution time.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::db::Database;

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub roles: BTreeMap<String, PathBuf>,
}

pub struct ProfileStore<'a> {
    db: &'a Database,
}

impl<'a> ProfileStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn create(&self, name: &str) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute("INSERT INTO profiles (name) VALUES (?)", [name])
            .with_context(|| format!("Failed to create profile '{}'", name))?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_or_create(&self, name: &str) -> Result<i64> {
        if let Some(profile) = self.get(name)? {
            return Ok(profile.id);
        }
        self.create(name)
    }

    /// Bind a role to a path, replacing any previous binding for that role.
    pub fn set_role(&self, profile_id: i64, role: &str, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.db.conn().execute(
            "INSERT OR REPLACE INTO profile_roles (profile_id, role, path) VALUES (?, ?, ?)",
            rusqlite::params![profile_id, role, path_str],
        )?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<Profile>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT id, name FROM profiles WHERE name = ?",
            [name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        );
        let (id, name) = match result {
            Ok(pair) => pair,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        drop(conn);
        Ok(Some(Profile {
            id,
            name,
            roles: self.roles(id)?,
        }))
    }

    pub fn get_by_id(&self, profile_id: i64) -> Result<Option<Profile>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT name FROM profiles WHERE id = ?",
            [profile_id],
            |row| row.get::<_, String>(0),
        );
        let name = match result {
            Ok(name) => name,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        drop(conn);
        Ok(Some(Profile {
            id: profile_id,
            name,
            roles: self.roles(profile_id)?,
        }))
    }

    pub fn list(&self) -> Result<Vec<Profile>> {
        let ids: Vec<(i64, String)> = {
            let conn = self.db.conn();
            let mut stmt = conn.prepare("SELECT id, name FROM profiles ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut profiles = Vec::with_capacity(ids.len());
        for (id, name) in ids {
            profiles.push(Profile {
                id,
                name,
                roles: self.roles(id)?,
            });
        }
        Ok(profiles)
    }

    pub fn roles(&self, profile_id: i64) -> Result<BTreeMap<String, PathBuf>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT role, path FROM profile_roles WHERE profile_id = ?")?;
        let roles = stmt
            .query_map([profile_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PathBuf::from(row.get::<_, String>(1)?),
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(roles)
    }

    pub fn role_path(&self, profile_id: i64, role: &str) -> Result<Option<PathBuf>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT path FROM profile_roles WHERE profile_id = ? AND role = ?",
            rusqlite::params![profile_id, role],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(path) => Ok(Some(PathBuf::from(path))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn create_and_get_profile_with_roles() {
        let db = setup();
        let store = ProfileStore::new(&db);

        let id = store.create("shoot-2024").unwrap();
        store.set_role(id, "target", Path::new("/media/target")).unwrap();
        store.set_role(id, "control", Path::new("/media/control")).unwrap();

        let profile = store.get("shoot-2024").unwrap().unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.roles.len(), 2);
        assert_eq!(
            profile.roles.get("target").unwrap(),
            Path::new("/media/target")
        );
    }

    #[test]
    fn set_role_overwrites_previous_binding() {
        let db = setup();
        let store = ProfileStore::new(&db);

        let id = store.create("p").unwrap();
        store.set_role(id, "target", Path::new("/old")).unwrap();
        store.set_role(id, "target", Path::new("/new")).unwrap();

        let roles = store.roles(id).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles.get("target").unwrap(), Path::new("/new"));
    }

    #[test]
    fn duplicate_profile_name_fails() {
        let db = setup();
        let store = ProfileStore::new(&db);
        store.create("p").unwrap();
        assert!(store.create("p").is_err());
    }
}
