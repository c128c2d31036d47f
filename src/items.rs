//! Item registry: stable per-file identity across renames.
//!
//! An item's key is derived from its folder identifier plus the relative
//! filename at first sighting and is never reassigned; only `current_path`
//! follows the file around as committed moves and renames land.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::identity::FolderIdentifier;

#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub id: i64,
    pub item_key: String,
    pub current_path: PathBuf,
}

pub struct ItemStore<'a> {
    db: &'a Database,
}

impl<'a> ItemStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Register a file on first sighting, or return its existing id.
    /// The key is fixed at creation; later observations never rewrite it.
    pub fn observe(
        &self,
        profile_id: i64,
        identifier: &FolderIdentifier,
        rel_name: &str,
        path: &Path,
    ) -> Result<i64> {
        let key = format!("{}{}", identifier.prefix(), rel_name);
        let path_str = path.to_string_lossy();
        let conn = self.db.conn();

        let existing = conn.query_row(
            "SELECT id FROM items WHERE profile_id = ? AND item_key = ?",
            rusqlite::params![profile_id, key],
            |row| row.get::<_, i64>(0),
        );
        match existing {
            Ok(id) => return Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        conn.execute(
            "INSERT INTO items (profile_id, item_key, current_path) VALUES (?, ?, ?)",
            rusqlite::params![profile_id, key, path_str],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, item_id: i64) -> Result<Option<ItemRecord>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT id, item_key, current_path FROM items WHERE id = ?",
            [item_id],
            |row| {
                Ok(ItemRecord {
                    id: row.get(0)?,
                    item_key: row.get(1)?,
                    current_path: PathBuf::from(row.get::<_, String>(2)?),
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn by_path(&self, path: &Path) -> Result<Option<ItemRecord>> {
        let path_str = path.to_string_lossy();
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT id, item_key, current_path FROM items WHERE current_path = ?",
            [path_str.as_ref()],
            |row| {
                Ok(ItemRecord {
                    id: row.get(0)?,
                    item_key: row.get(1)?,
                    current_path: PathBuf::from(row.get::<_, String>(2)?),
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Follow a committed move/rename. No-op if the old path is untracked.
    pub fn update_path(&self, old_path: &Path, new_path: &Path) -> Result<()> {
        let old_str = old_path.to_string_lossy();
        let new_str = new_path.to_string_lossy();
        self.db.conn().execute(
            "UPDATE items SET current_path = ? WHERE current_path = ?",
            rusqlite::params![new_str, old_str],
        )?;
        Ok(())
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
    fn observe_is_stable_across_path_changes() {
        let (db, profile_id) = setup();
        let items = ItemStore::new(&db);
        let ident = FolderIdentifier::new(1, 3);

        let id = items
            .observe(profile_id, &ident, "a.jpg", Path::new("/t/a.jpg"))
            .unwrap();
        items
            .update_path(Path::new("/t/a.jpg"), Path::new("/t/id001_a.jpg"))
            .unwrap();

        // Same key resolves to the same item even though the path moved.
        let again = items
            .observe(profile_id, &ident, "a.jpg", Path::new("/t/id001_a.jpg"))
            .unwrap();
        assert_eq!(id, again);

        let record = items.get(id).unwrap().unwrap();
        assert_eq!(record.current_path, Path::new("/t/id001_a.jpg"));
        assert_eq!(record.item_key, "id001_a.jpg");
    }

    #[test]
    fn by_path_finds_current_location() {
        let (db, profile_id) = setup();
        let items = ItemStore::new(&db);
        let ident = FolderIdentifier::new(2, 3);

        let id = items
            .observe(profile_id, &ident, "b.png", Path::new("/t/b.png"))
            .unwrap();
        let record = items.by_path(Path::new("/t/b.png")).unwrap().unwrap();
        assert_eq!(record.id, id);
        assert!(items.by_path(Path::new("/t/missing.png")).unwrap().is_none());
    }
}
