//! Folder identity store.
//!
//! Every logical source folder gets a stable, zero-padded numeric identifier
//! (`id001_`, `id002_`, ...) that survives path renames elsewhere in the
//! profile. Numbers are assigned monotonically and never reused: rows for
//! removed folders stay in the table with `removed_at` set, so the next
//! allocation still sees them.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderIdentifier {
    pub number: u32,
    width: u8,
}

impl FolderIdentifier {
    pub fn new(number: u32, width: u8) -> Self {
        Self { number, width }
    }

    /// The filename prefix form, e.g. `id007_`.
    pub fn prefix(&self) -> String {
        format!("id{:0width$}_", self.number, width = self.width as usize)
    }
}

impl fmt::Display for FolderIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

pub struct IdentityStore<'a> {
    db: &'a Database,
    width: u8,
}

impl<'a> IdentityStore<'a> {
    pub fn new(db: &'a Database, width: u8) -> Self {
        Self { db, width }
    }

    fn max_number(&self) -> u32 {
        10u32.pow(self.width as u32) - 1
    }

    /// Deterministic assignment: the same (profile, folder_path) always
    /// yields the same identifier; an unseen path gets max + 1.
    ///
    /// Allocation runs under the database lock, with a conditional-insert
    /// retry in case a competing writer lands the same row first.
    pub fn assign_or_get(&self, profile_id: i64, folder_path: &Path) -> Result<FolderIdentifier> {
        let path_str = folder_path.to_string_lossy();

        loop {
            let conn = self.db.conn();

            let existing = conn.query_row(
                "SELECT id_number FROM folder_identities WHERE profile_id = ? AND folder_path = ?",
                rusqlite::params![profile_id, path_str],
                |row| row.get::<_, u32>(0),
            );
            match existing {
                Ok(number) => return Ok(FolderIdentifier::new(number, self.width)),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }

            // Removed folders are included in MAX so their numbers stay burned.
            let max: u32 = conn.query_row(
                "SELECT COALESCE(MAX(id_number), 0) FROM folder_identities WHERE profile_id = ?",
                [profile_id],
                |row| row.get(0),
            )?;

            let next = max + 1;
            if next > self.max_number() {
                let profile: String = conn.query_row(
                    "SELECT name FROM profiles WHERE id = ?",
                    [profile_id],
                    |row| row.get(0),
                )?;
                return Err(EngineError::IdentitySpaceExhausted {
                    profile,
                    max: self.max_number(),
                }
                .into());
            }

            let inserted = conn.execute(
                "INSERT INTO folder_identities (profile_id, folder_path, id_number) VALUES (?, ?, ?)",
                rusqlite::params![profile_id, path_str, next],
            );
            match inserted {
                Ok(_) => return Ok(FolderIdentifier::new(next, self.width)),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Lost the race on either unique constraint; re-read.
                    drop(conn);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Mark a folder's identity as removed. The number is never reassigned.
    pub fn mark_removed(&self, profile_id: i64, folder_path: &Path) -> Result<()> {
        let path_str = folder_path.to_string_lossy();
        self.db.conn().execute(
            "UPDATE folder_identities SET removed_at = ? WHERE profile_id = ? AND folder_path = ? AND removed_at IS NULL",
            rusqlite::params![chrono::Utc::now().to_rfc3339(), profile_id, path_str],
        )?;
        Ok(())
    }

    /// Active folder -> identifier listing for a profile, ordered by number.
    pub fn list(&self, profile_id: i64) -> Result<Vec<(PathBuf, FolderIdentifier)>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT folder_path, id_number FROM folder_identities \
             WHERE profile_id = ? AND removed_at IS NULL ORDER BY id_number",
        )?;
        let width = self.width;
        let entries = stmt
            .query_map([profile_id], |row| {
                Ok((
                    PathBuf::from(row.get::<_, String>(0)?),
                    FolderIdentifier::new(row.get::<_, u32>(1)?, width),
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileStore;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let profile_id = ProfileStore::new(&db).create("p").unwrap();
        (db, profile_id)
    }

    #[test]
    fn assignment_is_deterministic() {
        let (db, profile_id) = setup();
        let store = IdentityStore::new(&db, 3);

        let first = store.assign_or_get(profile_id, Path::new("/media/a")).unwrap();
        let again = store.assign_or_get(profile_id, Path::new("/media/a")).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.prefix(), "id001_");
    }

    #[test]
    fn identifiers_are_strictly_increasing() {
        let (db, profile_id) = setup();
        let store = IdentityStore::new(&db, 3);

        let a = store.assign_or_get(profile_id, Path::new("/media/a")).unwrap();
        let b = store.assign_or_get(profile_id, Path::new("/media/b")).unwrap();
        let c = store.assign_or_get(profile_id, Path::new("/media/c")).unwrap();
        assert!(a.number < b.number && b.number < c.number);
    }

    #[test]
    fn removed_identifiers_are_never_reused() {
        let (db, profile_id) = setup();
        let store = IdentityStore::new(&db, 3);

        store.assign_or_get(profile_id, Path::new("/media/a")).unwrap();
        let b = store.assign_or_get(profile_id, Path::new("/media/b")).unwrap();
        store.mark_removed(profile_id, Path::new("/media/b")).unwrap();

        let c = store.assign_or_get(profile_id, Path::new("/media/c")).unwrap();
        assert!(c.number > b.number);

        let listed = store.list(profile_id).unwrap();
        assert_eq!(listed.len(), 2); // removed folder no longer listed
    }

    #[test]
    fn exhaustion_past_width_fails() {
        let (db, profile_id) = setup();
        let store = IdentityStore::new(&db, 1); // id1_ .. id9_

        for i in 0..9 {
            store
                .assign_or_get(profile_id, Path::new(&format!("/media/{i}")))
                .unwrap();
        }
        let err = store
            .assign_or_get(profile_id, Path::new("/media/overflow"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::IdentitySpaceExhausted { .. })
        ));
    }

    #[test]
    fn profiles_allocate_independently() {
        let (db, profile_a) = setup();
        let profile_b = ProfileStore::new(&db).create("q").unwrap();
        let store = IdentityStore::new(&db, 3);

        store.assign_or_get(profile_a, Path::new("/media/a")).unwrap();
        let other = store.assign_or_get(profile_b, Path::new("/media/a")).unwrap();
        assert_eq!(other.number, 1);
    }
}
