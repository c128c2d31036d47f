//! Staging ledger: declarative, reviewable file-operation proposals.
//!
//! Staging writes rows, never files. Each row belongs to a batch, carries a
//! deterministic sequence number, and ends its life in exactly one terminal
//! status: committed, failed (with a reason), or reverted. Pending rows can
//! be discarded without touching the filesystem.

use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::db::Database;
use crate::error::EngineError;
use crate::profiles::ProfileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Move,
    Copy,
    Rename,
    Delete,
    Categorize,
    Tag,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Move => "move",
            OpKind::Copy => "copy",
            OpKind::Rename => "rename",
            OpKind::Delete => "delete",
            OpKind::Categorize => "categorize",
            OpKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "move" => Ok(OpKind::Move),
            "copy" => Ok(OpKind::Copy),
            "rename" => Ok(OpKind::Rename),
            "delete" => Ok(OpKind::Delete),
            "categorize" => Ok(OpKind::Categorize),
            "tag" => Ok(OpKind::Tag),
            other => Err(EngineError::InvalidOperation(format!("unknown op kind '{other}'")).into()),
        }
    }

    fn requires_dest(&self) -> bool {
        matches!(self, OpKind::Move | OpKind::Copy | OpKind::Rename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpStatus {
    Pending,
    Committed,
    Failed,
    Reverted,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Pending => "pending",
            OpStatus::Committed => "committed",
            OpStatus::Failed => "failed",
            OpStatus::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OpStatus::Pending),
            "committed" => Ok(OpStatus::Committed),
            "failed" => Ok(OpStatus::Failed),
            "reverted" => Ok(OpStatus::Reverted),
            other => Err(EngineError::InvalidOperation(format!("unknown status '{other}'")).into()),
        }
    }
}

/// An operation as proposed by the matcher or a manual staging action.
#[derive(Debug, Clone)]
pub struct ProposedOp {
    pub kind: OpKind,
    pub source: PathBuf,
    pub dest: Option<PathBuf>,
    /// Parameters for metadata ops: `{"category": ...}` or
    /// `{"tag": ..., "value": ...}`.
    pub payload: Option<Value>,
}

impl ProposedOp {
    pub fn move_file(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            kind: OpKind::Move,
            source: source.into(),
            dest: Some(dest.into()),
            payload: None,
        }
    }

    pub fn copy_file(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            kind: OpKind::Copy,
            source: source.into(),
            dest: Some(dest.into()),
            payload: None,
        }
    }

    pub fn rename_file(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            kind: OpKind::Rename,
            source: source.into(),
            dest: Some(dest.into()),
            payload: None,
        }
    }

    pub fn delete_file(source: impl Into<PathBuf>) -> Self {
        Self {
            kind: OpKind::Delete,
            source: source.into(),
            dest: None,
            payload: None,
        }
    }

    pub fn categorize(source: impl Into<PathBuf>, category: &str) -> Self {
        Self {
            kind: OpKind::Categorize,
            source: source.into(),
            dest: None,
            payload: Some(serde_json::json!({ "category": category })),
        }
    }

    pub fn tag(source: impl Into<PathBuf>, tag: &str, value: Option<&str>) -> Self {
        Self {
            kind: OpKind::Tag,
            source: source.into(),
            dest: None,
            payload: Some(serde_json::json!({ "tag": tag, "value": value })),
        }
    }
}

/// A staged row as persisted in the ledger.
#[derive(Debug, Clone)]
pub struct StagedRow {
    pub id: i64,
    pub profile_id: i64,
    pub batch_id: String,
    pub sequence_no: i64,
    pub kind: OpKind,
    pub source: PathBuf,
    pub dest: Option<PathBuf>,
    pub payload: Option<Value>,
    pub status: OpStatus,
    pub error: Option<String>,
}

/// Per-batch status rollup for review listings.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub pending: i64,
    pub committed: i64,
    pub failed: i64,
    pub reverted: i64,
}

pub struct StagingLedger<'a> {
    db: &'a Database,
}

impl<'a> StagingLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Validate and append proposals to a batch. Rows are numbered from the
    /// batch's current maximum so re-staging extends rather than reorders.
    pub fn stage(&self, profile_id: i64, batch_id: &str, ops: &[ProposedOp]) -> Result<usize> {
        let roles = ProfileStore::new(self.db).roles(profile_id)?;
        if roles.is_empty() {
            return Err(EngineError::InvalidOperation(format!(
                "profile {profile_id} has no folder roles configured"
            ))
            .into());
        }
        let role_paths: Vec<&PathBuf> = roles.values().collect();

        // batch_ids are caller-chosen; a batch belongs to whichever profile
        // staged into it first, and never mixes profiles.
        if let Some(owner) = self.batch_profile(batch_id)? {
            if owner != profile_id {
                return Err(EngineError::InvalidOperation(format!(
                    "batch {batch_id} belongs to another profile"
                ))
                .into());
            }
        }

        let within_roles =
            |path: &Path| -> bool { role_paths.iter().any(|root| path.starts_with(root)) };

        // Destinations already pending in this batch count as taken.
        let mut taken_dests: Vec<PathBuf> = self
            .list_pending(batch_id)?
            .into_iter()
            .filter_map(|row| row.dest)
            .collect();

        for op in ops {
            if op.kind.requires_dest() && op.dest.is_none() {
                return Err(EngineError::InvalidOperation(format!(
                    "{} of {} requires a destination",
                    op.kind.as_str(),
                    op.source.display()
                ))
                .into());
            }
            if !op.source.is_absolute() {
                return Err(EngineError::InvalidOperation(format!(
                    "source {} is not absolute",
                    op.source.display()
                ))
                .into());
            }
            if !within_roles(&op.source) {
                return Err(EngineError::InvalidOperation(format!(
                    "source {} is outside every configured folder role",
                    op.source.display()
                ))
                .into());
            }
            if let Some(dest) = &op.dest {
                if !within_roles(dest) {
                    return Err(EngineError::InvalidOperation(format!(
                        "destination {} is outside every configured folder role",
                        dest.display()
                    ))
                    .into());
                }
                if taken_dests.iter().any(|d| d == dest) {
                    return Err(EngineError::InvalidOperation(format!(
                        "destination {} is staged twice in batch {batch_id}; resolve the collision first",
                        dest.display()
                    ))
                    .into());
                }
                taken_dests.push(dest.clone());
            }
            match op.kind {
                OpKind::Categorize => {
                    let ok = op
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("category"))
                        .and_then(Value::as_str)
                        .is_some();
                    if !ok {
                        return Err(EngineError::InvalidOperation(
                            "categorize requires a 'category' payload".to_string(),
                        )
                        .into());
                    }
                }
                OpKind::Tag => {
                    let ok = op
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("tag"))
                        .and_then(Value::as_str)
                        .is_some();
                    if !ok {
                        return Err(EngineError::InvalidOperation(
                            "tag requires a 'tag' payload".to_string(),
                        )
                        .into());
                    }
                }
                _ => {}
            }
        }

        let conn = self.db.conn();
        // Sequence numbers are unique per batch across both the ledger and
        // the processed log; undo appends inverse log entries under the same
        // batch_id, so new rows must clear those too.
        let mut next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM ( \
                 SELECT MAX(sequence_no) AS seq FROM staged_operations WHERE batch_id = ?1 \
                 UNION ALL \
                 SELECT MAX(sequence_no) FROM processed_log WHERE batch_id = ?1)",
            [batch_id],
            |row| row.get(0),
        )?;

        for op in ops {
            let payload = op.payload.as_ref().map(|p| p.to_string());
            conn.execute(
                "INSERT INTO staged_operations \
                 (profile_id, batch_id, sequence_no, op_kind, source_path, dest_path, payload) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    profile_id,
                    batch_id,
                    next_seq,
                    op.kind.as_str(),
                    op.source.to_string_lossy(),
                    op.dest.as_ref().map(|d| d.to_string_lossy().to_string()),
                    payload,
                ],
            )?;
            next_seq += 1;
        }

        tracing::info!("Staged {} operation(s) in batch {}", ops.len(), batch_id);
        Ok(ops.len())
    }

    fn rows_where(&self, batch_id: &str, status: Option<OpStatus>) -> Result<Vec<StagedRow>> {
        let conn = self.db.conn();
        let sql = match status {
            Some(_) => {
                "SELECT id, profile_id, batch_id, sequence_no, op_kind, source_path, dest_path, payload, status, error \
                 FROM staged_operations WHERE batch_id = ? AND status = ? ORDER BY sequence_no"
            }
            None => {
                "SELECT id, profile_id, batch_id, sequence_no, op_kind, source_path, dest_path, payload, status, error \
                 FROM staged_operations WHERE batch_id = ? ORDER BY sequence_no"
            }
        };
        let mut stmt = conn.prepare(sql)?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(
            i64,
            i64,
            String,
            i64,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            Option<String>,
        )> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ))
        };

        let raw: Vec<_> = match status {
            Some(s) => stmt
                .query_map(rusqlite::params![batch_id, s.as_str()], map_row)?
                .filter_map(|r| r.ok())
                .collect(),
            None => stmt
                .query_map([batch_id], map_row)?
                .filter_map(|r| r.ok())
                .collect(),
        };

        let mut rows = Vec::with_capacity(raw.len());
        for (id, profile_id, batch_id, sequence_no, kind, source, dest, payload, status, error) in raw {
            rows.push(StagedRow {
                id,
                profile_id,
                batch_id,
                sequence_no,
                kind: OpKind::parse(&kind)?,
                source: PathBuf::from(source),
                dest: dest.map(PathBuf::from),
                payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
                status: OpStatus::parse(&status)?,
                error,
            });
        }
        Ok(rows)
    }

    /// Pending rows of a batch in execution order.
    pub fn list_pending(&self, batch_id: &str) -> Result<Vec<StagedRow>> {
        self.rows_where(batch_id, Some(OpStatus::Pending))
    }

    /// Every row of a batch regardless of status.
    pub fn list_batch(&self, batch_id: &str) -> Result<Vec<StagedRow>> {
        self.rows_where(batch_id, None)
    }

    /// Batch rollups for a profile, newest first.
    pub fn list_batches(&self, profile_id: i64) -> Result<Vec<BatchSummary>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT batch_id, \
                    SUM(status = 'pending'), SUM(status = 'committed'), \
                    SUM(status = 'failed'), SUM(status = 'reverted') \
             FROM staged_operations WHERE profile_id = ? \
             GROUP BY batch_id ORDER BY MAX(created_at) DESC, batch_id",
        )?;
        let summaries = stmt
            .query_map([profile_id], |row| {
                Ok(BatchSummary {
                    batch_id: row.get(0)?,
                    pending: row.get(1)?,
                    committed: row.get(2)?,
                    failed: row.get(3)?,
                    reverted: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(summaries)
    }

    /// Drop the pending rows of a batch. Executed rows are untouched and the
    /// filesystem is never consulted.
    pub fn discard(&self, batch_id: &str) -> Result<usize> {
        let removed = self.db.conn().execute(
            "DELETE FROM staged_operations WHERE batch_id = ? AND status = 'pending'",
            [batch_id],
        )?;
        tracing::info!("Discarded {} pending row(s) from batch {}", removed, batch_id);
        Ok(removed)
    }

    pub(crate) fn mark_status(
        &self,
        row_id: i64,
        status: OpStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.db.conn().execute(
            "UPDATE staged_operations SET status = ?, error = ? WHERE id = ?",
            rusqlite::params![status.as_str(), error, row_id],
        )?;
        Ok(())
    }

    pub(crate) fn mark_reverted(&self, batch_id: &str, sequence_no: i64) -> Result<()> {
        self.db.conn().execute(
            "UPDATE staged_operations SET status = 'reverted' \
             WHERE batch_id = ? AND sequence_no = ? AND status = 'committed'",
            rusqlite::params![batch_id, sequence_no],
        )?;
        Ok(())
    }

    /// The profile a batch belongs to, if the batch exists.
    pub fn batch_profile(&self, batch_id: &str) -> Result<Option<i64>> {
        let conn = self.db.conn();
        let result = conn.query_row(
            "SELECT profile_id FROM staged_operations WHERE batch_id = ? LIMIT 1",
            [batch_id],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::ProfileStore;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let profiles = ProfileStore::new(&db);
        let profile_id = profiles.create("p").unwrap();
        profiles.set_role(profile_id, "target", Path::new("/media/target")).unwrap();
        profiles.set_role(profile_id, "control", Path::new("/media/control")).unwrap();
        (db, profile_id)
    }

    #[test]
    fn stage_assigns_sequential_numbers() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        let ops = vec![
            ProposedOp::move_file("/media/target/a.jpg", "/media/target/id001_a.jpg"),
            ProposedOp::delete_file("/media/control/b.jpg"),
        ];
        ledger.stage(profile_id, "b1", &ops).unwrap();
        ledger
            .stage(profile_id, "b1", &[ProposedOp::delete_file("/media/target/c.jpg")])
            .unwrap();

        let rows = ledger.list_pending("b1").unwrap();
        let seqs: Vec<i64> = rows.iter().map(|r| r.sequence_no).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn source_outside_roles_is_rejected() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        let err = ledger
            .stage(
                profile_id,
                "b1",
                &[ProposedOp::delete_file("/somewhere/else/a.jpg")],
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidOperation(_))
        ));
        assert!(ledger.list_pending("b1").unwrap().is_empty());
    }

    #[test]
    fn duplicate_destination_in_batch_is_rejected() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        ledger
            .stage(
                profile_id,
                "b1",
                &[ProposedOp::move_file("/media/target/a.jpg", "/media/target/id001_x.jpg")],
            )
            .unwrap();

        let err = ledger
            .stage(
                profile_id,
                "b1",
                &[ProposedOp::move_file("/media/control/b.jpg", "/media/target/id001_x.jpg")],
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidOperation(_))
        ));
    }

    #[test]
    fn batch_ids_are_scoped_to_one_profile() {
        let (db, profile_a) = setup();
        let profiles = ProfileStore::new(&db);
        let profile_b = profiles.create("q").unwrap();
        profiles.set_role(profile_b, "target", Path::new("/other/target")).unwrap();

        let ledger = StagingLedger::new(&db);
        ledger
            .stage(
                profile_a,
                "shared",
                &[ProposedOp::categorize("/media/target/a.jpg", "keep")],
            )
            .unwrap();

        // A second profile reusing the same batch_id must be turned away,
        // or commit would resolve its rows under the first profile.
        let err = ledger
            .stage(
                profile_b,
                "shared",
                &[ProposedOp::categorize("/other/target/b.jpg", "keep")],
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidOperation(_))
        ));

        let rows = ledger.list_batch("shared").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].profile_id, profile_a);
    }

    #[test]
    fn move_without_dest_is_rejected() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        let op = ProposedOp {
            kind: OpKind::Move,
            source: PathBuf::from("/media/target/a.jpg"),
            dest: None,
            payload: None,
        };
        assert!(ledger.stage(profile_id, "b1", &[op]).is_err());
    }

    #[test]
    fn discard_removes_only_pending() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        ledger
            .stage(
                profile_id,
                "b1",
                &[
                    ProposedOp::delete_file("/media/target/a.jpg"),
                    ProposedOp::delete_file("/media/target/b.jpg"),
                ],
            )
            .unwrap();
        let rows = ledger.list_pending("b1").unwrap();
        ledger
            .mark_status(rows[0].id, OpStatus::Committed, None)
            .unwrap();

        assert_eq!(ledger.discard("b1").unwrap(), 1);
        let remaining = ledger.list_batch("b1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, OpStatus::Committed);
    }

    #[test]
    fn batch_summaries_roll_up_statuses() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        ledger
            .stage(
                profile_id,
                "b1",
                &[
                    ProposedOp::delete_file("/media/target/a.jpg"),
                    ProposedOp::delete_file("/media/target/b.jpg"),
                ],
            )
            .unwrap();
        let rows = ledger.list_pending("b1").unwrap();
        ledger.mark_status(rows[0].id, OpStatus::Failed, Some("gone")).unwrap();

        let summaries = ledger.list_batches(profile_id).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pending, 1);
        assert_eq!(summaries[0].failed, 1);
    }

    #[test]
    fn tag_payload_is_validated() {
        let (db, profile_id) = setup();
        let ledger = StagingLedger::new(&db);

        let bad = ProposedOp {
            kind: OpKind::Tag,
            source: PathBuf::from("/media/target/a.jpg"),
            dest: None,
            payload: None,
        };
        assert!(ledger.stage(profile_id, "b1", &[bad]).is_err());

        let good = ProposedOp::tag("/media/target/a.jpg", "rating", Some("5"));
        assert_eq!(ledger.stage(profile_id, "b1", &[good]).unwrap(), 1);
    }
}
