//! Tag, category, and pairing state keyed by stable item ids.
//!
//! Categories are exclusive: assigning a category to an item overwrites any
//! prior assignment. Pairings are symmetric and at most one active pairing
//! per item; conflicting links fail until the caller unlinks explicitly.

use anyhow::Result;

use crate::db::Database;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Pairing {
    pub id: i64,
    pub item_a: i64,
    pub item_b: i64,
}

pub struct TagStore<'a> {
    db: &'a Database,
}

impl<'a> TagStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    // ========================================================================
    // Tags
    // ========================================================================

    /// Set or replace a tag. Returns the prior value slot, if the tag was
    /// already present (used by undo to restore state).
    pub fn set_tag(
        &self,
        item_id: i64,
        tag: &str,
        value: Option<&str>,
    ) -> Result<Option<Option<String>>> {
        let prior = self.get_tag(item_id, tag)?;
        self.db.conn().execute(
            "INSERT OR REPLACE INTO item_tags (item_id, tag, value) VALUES (?, ?, ?)",
            rusqlite::params![item_id, tag, value],
        )?;
        Ok(prior)
    }

    pub fn get_tag(&self, item_id: i64, tag: &str) -> Result<Option<Option<String>>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT value FROM item_tags WHERE item_id = ? AND tag = ?",
            rusqlite::params![item_id, tag],
            |row| row.get::<_, Option<String>>(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear_tag(&self, item_id: i64, tag: &str) -> Result<()> {
        self.db.conn().execute(
            "DELETE FROM item_tags WHERE item_id = ? AND tag = ?",
            rusqlite::params![item_id, tag],
        )?;
        Ok(())
    }

    pub fn list_tags(&self, item_id: i64) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT tag, value FROM item_tags WHERE item_id = ? ORDER BY tag")?;
        let tags = stmt
            .query_map([item_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    fn find_or_create_category(&self, profile_id: i64, name: &str) -> Result<i64> {
        let conn = self.db.conn();
        let existing = conn.query_row(
            "SELECT id FROM categories WHERE profile_id = ? AND name = ?",
            rusqlite::params![profile_id, name],
            |row| row.get::<_, i64>(0),
        );
        match existing {
            Ok(id) => return Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }
        conn.execute(
            "INSERT INTO categories (profile_id, name) VALUES (?, ?)",
            rusqlite::params![profile_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Assign a category, overwriting the item's prior single assignment.
    /// Returns the prior category name, if any.
    pub fn assign_category(
        &self,
        profile_id: i64,
        item_id: i64,
        category: &str,
    ) -> Result<Option<String>> {
        let prior = self.category_of(item_id)?;
        let category_id = self.find_or_create_category(profile_id, category)?;
        self.db.conn().execute(
            "INSERT OR REPLACE INTO item_categories (item_id, category_id) VALUES (?, ?)",
            rusqlite::params![item_id, category_id],
        )?;
        Ok(prior)
    }

    pub fn remove_category(&self, item_id: i64) -> Result<()> {
        self.db.conn().execute(
            "DELETE FROM item_categories WHERE item_id = ?",
            [item_id],
        )?;
        Ok(())
    }

    pub fn category_of(&self, item_id: i64) -> Result<Option<String>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT c.name FROM item_categories ic \
             JOIN categories c ON ic.category_id = c.id \
             WHERE ic.item_id = ?",
            [item_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(name) => Ok(Some(name)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_categories(&self, profile_id: i64) -> Result<Vec<String>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare("SELECT name FROM categories WHERE profile_id = ? ORDER BY name")?;
        let names = stmt
            .query_map([profile_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(names)
    }

    pub fn rename_category(&self, profile_id: i64, old: &str, new: &str) -> Result<()> {
        self.db.conn().execute(
            "UPDATE categories SET name = ? WHERE profile_id = ? AND name = ?",
            rusqlite::params![new, profile_id, old],
        )?;
        Ok(())
    }

    /// Items currently assigned to a category, by item id.
    pub fn items_in_category(&self, profile_id: i64, category: &str) -> Result<Vec<i64>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT ic.item_id FROM item_categories ic \
             JOIN categories c ON ic.category_id = c.id \
             WHERE c.profile_id = ? AND c.name = ? ORDER BY ic.item_id",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![profile_id, category], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    // ========================================================================
    // Pairings
    // ========================================================================

    pub fn active_pairing(&self, item_id: i64) -> Result<Option<Pairing>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT id, item_a, item_b FROM pairings \
             WHERE active = 1 AND (item_a = ? OR item_b = ?)",
            rusqlite::params![item_id, item_id],
            |row| {
                Ok(Pairing {
                    id: row.get(0)?,
                    item_a: row.get(1)?,
                    item_b: row.get(2)?,
                })
            },
        );
        match result {
            Ok(pairing) => Ok(Some(pairing)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Link two items as a matched pair. Fails with `PairingConflict` if
    /// either item already has an active pairing.
    pub fn link_pair(&self, item_a: i64, item_b: i64) -> Result<i64> {
        if item_a == item_b {
            return Err(EngineError::InvalidOperation(
                "cannot pair an item with itself".to_string(),
            )
            .into());
        }
        for item_id in [item_a, item_b] {
            if self.active_pairing(item_id)?.is_some() {
                return Err(EngineError::PairingConflict { item_id }.into());
            }
        }
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO pairings (item_a, item_b) VALUES (?, ?)",
            rusqlite::params![item_a.min(item_b), item_a.max(item_b)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Deactivate the item's active pairing, if any. The row is kept.
    pub fn unlink_pair(&self, item_id: i64) -> Result<bool> {
        let updated = self.db.conn().execute(
            "UPDATE pairings SET active = 0, unlinked_at = ? \
             WHERE active = 1 AND (item_a = ? OR item_b = ?)",
            rusqlite::params![chrono::Utc::now().to_rfc3339(), item_id, item_id],
        )?;
        Ok(updated > 0)
    }
}
