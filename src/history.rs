//! Processed log: the forward-only audit trail, and undo built on top of it.
//!
//! Every executed row leaves an entry here. Undo never rewrites history: it
//! applies inverse operations in reverse sequence order, appends them as new
//! entries pointing back at what they reverse, and flips the `reverted` flag
//! on the forward entry. The log only ever grows.

use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::Database;
use crate::error::EngineError;
use crate::executor::{CancelToken, RowFailure};
use crate::fsops;
use crate::items::ItemStore;
use crate::ledger::{OpKind, StagingLedger};
use crate::tags::TagStore;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub id: i64,
    pub batch_id: String,
    pub sequence_no: i64,
    pub kind: OpKind,
    pub source: PathBuf,
    pub dest: Option<PathBuf>,
    pub detail: Option<Value>,
    pub inverse_of: Option<i64>,
    pub reverted: bool,
}

#[derive(Debug, Clone)]
pub struct UndoResult {
    pub batch_id: String,
    /// Sequence numbers of the forward entries that were reversed.
    pub reverted: Vec<i64>,
    pub failed: Vec<RowFailure>,
    pub cancelled: bool,
}

impl UndoResult {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || self.cancelled
    }
}

pub struct HistoryLog<'a> {
    db: &'a Database,
}

impl<'a> HistoryLog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Append one entry. `inverse_of` is set only by undo.
    pub fn append(
        &self,
        batch_id: &str,
        sequence_no: i64,
        kind: OpKind,
        source: &Path,
        dest: Option<&Path>,
        detail: Option<Value>,
        inverse_of: Option<i64>,
    ) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO processed_log \
             (batch_id, sequence_no, op_kind, source_path, dest_path, detail, inverse_of) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                batch_id,
                sequence_no,
                kind.as_str(),
                source.to_string_lossy(),
                dest.map(|d| d.to_string_lossy().to_string()),
                detail.map(|d| d.to_string()),
                inverse_of,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn entries_where(&self, batch_id: &str, forward_unreverted: bool) -> Result<Vec<LogEntry>> {
        let conn = self.db.conn();
        let sql = if forward_unreverted {
            "SELECT id, batch_id, sequence_no, op_kind, source_path, dest_path, detail, inverse_of, reverted \
             FROM processed_log WHERE batch_id = ? AND inverse_of IS NULL AND reverted = 0 \
             ORDER BY sequence_no"
        } else {
            "SELECT id, batch_id, sequence_no, op_kind, source_path, dest_path, detail, inverse_of, reverted \
             FROM processed_log WHERE batch_id = ? ORDER BY sequence_no"
        };
        let mut stmt = conn.prepare(sql)?;
        let raw: Vec<_> = stmt
            .query_map([batch_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let mut entries = Vec::with_capacity(raw.len());
        for (id, batch_id, sequence_no, kind, source, dest, detail, inverse_of, reverted) in raw {
            entries.push(LogEntry {
                id,
                batch_id,
                sequence_no,
                kind: OpKind::parse(&kind)?,
                source: PathBuf::from(source),
                dest: dest.map(PathBuf::from),
                detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
                inverse_of,
                reverted: reverted != 0,
            });
        }
        Ok(entries)
    }

    /// Forward entries of a batch (inverses excluded), in sequence order.
    pub fn forward_entries(&self, batch_id: &str) -> Result<Vec<LogEntry>> {
        let all = self.entries_where(batch_id, false)?;
        Ok(all.into_iter().filter(|e| e.inverse_of.is_none()).collect())
    }

    /// Every entry of a batch, forward and inverse, in sequence order.
    pub fn entries(&self, batch_id: &str) -> Result<Vec<LogEntry>> {
        self.entries_where(batch_id, false)
    }

    /// Reverse the committed effects of a batch.
    ///
    /// Forward entries are undone newest-first; each successful reversal
    /// appends an inverse entry, marks the forward entry reverted, and flips
    /// the staged row to reverted. A row that cannot be reversed (the file
    /// moved out from under us) is reported and skipped; the rest of the
    /// batch is still undone.
    pub fn undo(&self, config: &Config, batch_id: &str, cancel: &CancelToken) -> Result<UndoResult> {
        let mut pending = self.entries_where(batch_id, true)?;
        if pending.is_empty() {
            return Err(EngineError::NothingToUndo {
                batch_id: batch_id.to_string(),
            }
            .into());
        }
        pending.reverse();

        let ledger = StagingLedger::new(self.db);
        let profile_id = ledger.batch_profile(batch_id)?;

        // Inverse entries continue the batch's sequence range; take the max
        // across the ledger too so rows staged later never reuse a number.
        let mut next_seq: i64 = self.db.conn().query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM ( \
                 SELECT MAX(sequence_no) AS seq FROM processed_log WHERE batch_id = ?1 \
                 UNION ALL \
                 SELECT MAX(sequence_no) FROM staged_operations WHERE batch_id = ?1)",
            [batch_id],
            |row| row.get(0),
        )?;

        let mut result = UndoResult {
            batch_id: batch_id.to_string(),
            reverted: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        };

        for entry in pending {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Undo of batch {} cancelled before entry {}",
                    batch_id,
                    entry.sequence_no
                );
                result.cancelled = true;
                break;
            }

            match self.reverse_entry(config, profile_id, &entry) {
                Ok((inv_kind, inv_source, inv_dest, inv_detail)) => {
                    self.db.conn().execute(
                        "UPDATE processed_log SET reverted = 1 WHERE id = ?",
                        [entry.id],
                    )?;
                    self.append(
                        batch_id,
                        next_seq,
                        inv_kind,
                        &inv_source,
                        inv_dest.as_deref(),
                        inv_detail,
                        Some(entry.id),
                    )?;
                    next_seq += 1;
                    ledger.mark_reverted(batch_id, entry.sequence_no)?;
                    result.reverted.push(entry.sequence_no);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    tracing::warn!(
                        "Undo of entry {} in batch {} failed: {}",
                        entry.sequence_no,
                        batch_id,
                        reason
                    );
                    result.failed.push(RowFailure {
                        sequence_no: entry.sequence_no,
                        source: entry.source.clone(),
                        error: reason,
                    });
                }
            }
        }

        tracing::info!(
            "Undid batch {}: {} reverted, {} failed{}",
            batch_id,
            result.reverted.len(),
            result.failed.len(),
            if result.cancelled { ", cancelled" } else { "" }
        );
        Ok(result)
    }

    /// Apply the inverse of one forward entry and describe what was done.
    fn reverse_entry(
        &self,
        config: &Config,
        profile_id: Option<i64>,
        entry: &LogEntry,
    ) -> Result<(OpKind, PathBuf, Option<PathBuf>, Option<Value>)> {
        match entry.kind {
            OpKind::Move | OpKind::Rename => {
                let dest = entry.dest.clone().ok_or_else(|| {
                    EngineError::InvalidOperation("move entry without destination".to_string())
                })?;
                if !dest.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: dest,
                        reason: "file is no longer where the batch put it".to_string(),
                    }
                    .into());
                }
                if entry.source.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: entry.source.clone(),
                        reason: "original location is occupied".to_string(),
                    }
                    .into());
                }
                fsops::move_file(&dest, &entry.source)?;
                ItemStore::new(self.db).update_path(&dest, &entry.source)?;
                Ok((entry.kind, dest, Some(entry.source.clone()), None))
            }
            OpKind::Copy => {
                // The copy is surplus; relocating it keeps it recoverable.
                let dest = entry.dest.clone().ok_or_else(|| {
                    EngineError::InvalidOperation("copy entry without destination".to_string())
                })?;
                let relocated = fsops::soft_delete(&dest, &config.soft_delete.path)?;
                Ok((OpKind::Delete, dest, Some(relocated), None))
            }
            OpKind::Delete => {
                // Forward dest is the soft-delete location; move it back.
                let relocated = entry.dest.clone().ok_or_else(|| {
                    EngineError::InvalidOperation("delete entry without relocation".to_string())
                })?;
                if !relocated.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: relocated,
                        reason: "soft-deleted file is gone".to_string(),
                    }
                    .into());
                }
                if entry.source.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: entry.source.clone(),
                        reason: "original location is occupied".to_string(),
                    }
                    .into());
                }
                fsops::move_file(&relocated, &entry.source)?;
                fsops::normalize_permissions(&entry.source);
                ItemStore::new(self.db).update_path(&relocated, &entry.source)?;
                Ok((OpKind::Move, relocated, Some(entry.source.clone()), None))
            }
            OpKind::Categorize => {
                let detail = entry.detail.as_ref().ok_or_else(|| {
                    EngineError::InvalidOperation("categorize entry without snapshot".to_string())
                })?;
                let item_id = detail
                    .get("item_id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        EngineError::InvalidOperation("categorize snapshot lost its item".to_string())
                    })?;
                let tags = TagStore::new(self.db);
                match detail.get("prior").and_then(Value::as_str) {
                    Some(prior) => {
                        let profile_id = profile_id.ok_or_else(|| {
                            EngineError::InvalidOperation(format!(
                                "batch {} has no staged rows",
                                entry.batch_id
                            ))
                        })?;
                        tags.assign_category(profile_id, item_id, prior)?;
                    }
                    None => tags.remove_category(item_id)?,
                }
                Ok((OpKind::Categorize, entry.source.clone(), None, Some(detail.clone())))
            }
            OpKind::Tag => {
                let detail = entry.detail.as_ref().ok_or_else(|| {
                    EngineError::InvalidOperation("tag entry without snapshot".to_string())
                })?;
                let item_id = detail
                    .get("item_id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        EngineError::InvalidOperation("tag snapshot lost its item".to_string())
                    })?;
                let tag = detail
                    .get("tag")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        EngineError::InvalidOperation("tag snapshot lost its tag name".to_string())
                    })?;
                let tags = TagStore::new(self.db);
                let prior_present = detail
                    .get("prior_present")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if prior_present {
                    let prior_value = detail.get("prior_value").and_then(Value::as_str);
                    tags.set_tag(item_id, tag, prior_value)?;
                } else {
                    tags.clear_tag(item_id, tag)?;
                }
                Ok((OpKind::Tag, entry.source.clone(), None, Some(detail.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommitExecutor;
    use crate::ledger::{OpStatus, ProposedOp};
    use crate::profiles::ProfileStore;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        db: Database,
        config: Config,
        profile_id: i64,
        target: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();

        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let profiles = ProfileStore::new(&db);
        let profile_id = profiles.create("p").unwrap();
        profiles.set_role(profile_id, "target", &target).unwrap();

        let mut config = Config::default();
        config.soft_delete.path = dir.path().join(".deleted");

        Fixture {
            _dir: dir,
            db,
            config,
            profile_id,
            target,
        }
    }

    fn write_file(path: &Path, contents: &[u8]) {
        File::create(path).unwrap().write_all(contents).unwrap();
    }

    fn commit(fx: &Fixture, batch_id: &str, ops: &[ProposedOp]) {
        StagingLedger::new(&fx.db)
            .stage(fx.profile_id, batch_id, ops)
            .unwrap();
        let result = CommitExecutor::new(&fx.db, &fx.config)
            .commit(batch_id, &CancelToken::new())
            .unwrap();
        assert!(result.failed.is_empty());
    }

    #[test]
    fn undo_restores_moved_files_and_grows_history() {
        let fx = fixture();
        let src = fx.target.join("a.jpg");
        let dest = fx.target.join("id001_a.jpg");
        write_file(&src, b"pixels");
        commit(&fx, "b1", &[ProposedOp::move_file(&src, &dest)]);
        assert!(!src.exists() && dest.exists());

        let history = HistoryLog::new(&fx.db);
        let result = history.undo(&fx.config, "b1", &CancelToken::new()).unwrap();
        assert_eq!(result.reverted, vec![1]);
        assert!(!result.is_partial());
        assert!(src.exists() && !dest.exists());

        // Two entries now: the forward move (flagged reverted) and its inverse.
        let entries = history.entries("b1").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].reverted);
        assert_eq!(entries[1].inverse_of, Some(entries[0].id));
        assert_eq!(entries[1].sequence_no, 2);

        let rows = StagingLedger::new(&fx.db).list_batch("b1").unwrap();
        assert_eq!(rows[0].status, OpStatus::Reverted);
    }

    #[test]
    fn undo_of_delete_brings_the_file_back() {
        let fx = fixture();
        let src = fx.target.join("a.jpg");
        write_file(&src, b"soft");
        commit(&fx, "b1", &[ProposedOp::delete_file(&src)]);
        assert!(!src.exists());

        HistoryLog::new(&fx.db)
            .undo(&fx.config, "b1", &CancelToken::new())
            .unwrap();
        assert_eq!(fs::read(&src).unwrap(), b"soft");
    }

    #[test]
    fn undo_of_copy_soft_deletes_the_copy() {
        let fx = fixture();
        let src = fx.target.join("a.jpg");
        let dest = fx.target.join("a_copy.jpg");
        write_file(&src, b"dup");
        commit(&fx, "b1", &[ProposedOp::copy_file(&src, &dest)]);

        HistoryLog::new(&fx.db)
            .undo(&fx.config, "b1", &CancelToken::new())
            .unwrap();
        assert!(src.exists());
        assert!(!dest.exists());

        // The copy was relocated, not unlinked.
        let trashed: Vec<_> = fs::read_dir(&fx.config.soft_delete.path)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(trashed.len(), 1);
    }

    #[test]
    fn undo_restores_prior_category_and_tags() {
        let fx = fixture();
        let src = fx.target.join("a.jpg");
        write_file(&src, b"x");

        commit(&fx, "b1", &[ProposedOp::categorize(&src, "landscape")]);
        commit(
            &fx,
            "b2",
            &[
                ProposedOp::categorize(&src, "portrait"),
                ProposedOp::tag(&src, "rating", Some("5")),
            ],
        );

        let items = ItemStore::new(&fx.db);
        let item = items.by_path(&src).unwrap().unwrap();
        let tags = TagStore::new(&fx.db);
        assert_eq!(tags.category_of(item.id).unwrap().as_deref(), Some("portrait"));

        HistoryLog::new(&fx.db)
            .undo(&fx.config, "b2", &CancelToken::new())
            .unwrap();
        assert_eq!(tags.category_of(item.id).unwrap().as_deref(), Some("landscape"));
        assert!(tags.get_tag(item.id, "rating").unwrap().is_none());
    }

    #[test]
    fn undo_applies_in_reverse_order() {
        let fx = fixture();
        let a = fx.target.join("a.jpg");
        write_file(&a, b"a");
        // Chained moves within one batch; only reverse order can unwind them.
        commit(
            &fx,
            "b1",
            &[
                ProposedOp::move_file(&a, fx.target.join("b.jpg")),
                ProposedOp::move_file(fx.target.join("b.jpg"), fx.target.join("c.jpg")),
            ],
        );
        assert!(fx.target.join("c.jpg").exists());

        let result = HistoryLog::new(&fx.db)
            .undo(&fx.config, "b1", &CancelToken::new())
            .unwrap();
        assert_eq!(result.reverted, vec![2, 1]);
        assert!(a.exists());
        assert!(!fx.target.join("b.jpg").exists());
        assert!(!fx.target.join("c.jpg").exists());
    }

    #[test]
    fn extending_a_batch_after_undo_keeps_sequence_numbers_unique() {
        let fx = fixture();
        let a = fx.target.join("a.jpg");
        write_file(&a, b"a");
        commit(&fx, "b1", &[ProposedOp::delete_file(&a)]);

        let history = HistoryLog::new(&fx.db);
        history.undo(&fx.config, "b1", &CancelToken::new()).unwrap();

        // New rows must not reuse the sequence number the inverse entry took.
        let b = fx.target.join("b.jpg");
        write_file(&b, b"b");
        commit(&fx, "b1", &[ProposedOp::delete_file(&b)]);

        let entries = history.entries("b1").unwrap();
        assert_eq!(entries.len(), 3);
        let mut seqs: Vec<i64> = entries.iter().map(|e| e.sequence_no).collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), 3);

        // Undoing the extension reverses only the new row; the first row was
        // already reverted and stays that way.
        let result = history.undo(&fx.config, "b1", &CancelToken::new()).unwrap();
        assert_eq!(result.reverted, vec![3]);
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn undo_without_committed_work_is_an_error() {
        let fx = fixture();
        let err = HistoryLog::new(&fx.db)
            .undo(&fx.config, "never-ran", &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NothingToUndo { .. })
        ));
    }

    #[test]
    fn second_undo_of_same_batch_fails() {
        let fx = fixture();
        let src = fx.target.join("a.jpg");
        write_file(&src, b"x");
        commit(&fx, "b1", &[ProposedOp::delete_file(&src)]);

        let history = HistoryLog::new(&fx.db);
        history.undo(&fx.config, "b1", &CancelToken::new()).unwrap();
        let err = history
            .undo(&fx.config, "b1", &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::NothingToUndo { .. })
        ));
    }

    #[test]
    fn undo_skips_rows_whose_files_moved_away() {
        let fx = fixture();
        let a = fx.target.join("a.jpg");
        let b = fx.target.join("b.jpg");
        write_file(&a, b"a");
        write_file(&b, b"b");
        commit(
            &fx,
            "b1",
            &[
                ProposedOp::move_file(&a, fx.target.join("id001_a.jpg")),
                ProposedOp::move_file(&b, fx.target.join("id001_b.jpg")),
            ],
        );

        // Someone moved the first result out from under us.
        fs::remove_file(fx.target.join("id001_a.jpg")).unwrap();

        let result = HistoryLog::new(&fx.db)
            .undo(&fx.config, "b1", &CancelToken::new())
            .unwrap();
        assert_eq!(result.reverted, vec![2]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].sequence_no, 1);
        assert!(b.exists());
    }
}
