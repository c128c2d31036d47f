//! Commit executor: applies a batch of pending staged operations.
//!
//! Execution is transactional per item, not per batch: each row is verified,
//! applied, logged, and marked in turn; a failing row is recorded with its
//! reason and does not abort its siblings. Already-committed rows stay
//! committed no matter what fails later, and the batch result reports the
//! partial outcome. Cancellation is honoured between rows, never mid-row.

use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::error::EngineError;
use crate::fsops;
use crate::history::HistoryLog;
use crate::identity::IdentityStore;
use crate::items::ItemStore;
use crate::ledger::{OpKind, OpStatus, StagedRow, StagingLedger};
use crate::tags::TagStore;

/// Cooperative cancellation shared between a caller and a running batch.
/// Checked before each row; rows already committed remain committed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A row that executed successfully.
#[derive(Debug, Clone)]
pub struct RowOutcome {
    pub sequence_no: i64,
    pub kind: OpKind,
    pub source: PathBuf,
    pub dest: Option<PathBuf>,
}

/// A row that failed, with the reason it was recorded under.
#[derive(Debug, Clone)]
pub struct RowFailure {
    pub sequence_no: i64,
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct CommitResult {
    pub batch_id: String,
    pub succeeded: Vec<RowOutcome>,
    pub failed: Vec<RowFailure>,
    pub cancelled: bool,
}

impl CommitResult {
    /// Some rows failed or were never reached; the batch is reported
    /// partial, not errored.
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty() || self.cancelled
    }
}

pub struct CommitExecutor<'a> {
    db: &'a Database,
    config: &'a Config,
}

impl<'a> CommitExecutor<'a> {
    pub fn new(db: &'a Database, config: &'a Config) -> Self {
        Self { db, config }
    }

    /// Execute every pending row of a batch in sequence order.
    pub fn commit(&self, batch_id: &str, cancel: &CancelToken) -> Result<CommitResult> {
        let ledger = StagingLedger::new(self.db);
        let profile_id = ledger.batch_profile(batch_id)?.ok_or_else(|| {
            EngineError::InvalidOperation(format!("batch {batch_id} has no staged rows"))
        })?;
        let rows = ledger.list_pending(batch_id)?;

        let mut result = CommitResult {
            batch_id: batch_id.to_string(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            cancelled: false,
        };

        for row in rows {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Commit of batch {} cancelled before row {}",
                    batch_id,
                    row.sequence_no
                );
                result.cancelled = true;
                break;
            }

            match self.execute_row(profile_id, &row) {
                Ok((dest, detail)) => {
                    HistoryLog::new(self.db).append(
                        batch_id,
                        row.sequence_no,
                        row.kind,
                        &row.source,
                        dest.as_deref(),
                        detail,
                        None,
                    )?;
                    ledger.mark_status(row.id, OpStatus::Committed, None)?;
                    result.succeeded.push(RowOutcome {
                        sequence_no: row.sequence_no,
                        kind: row.kind,
                        source: row.source.clone(),
                        dest,
                    });
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    tracing::warn!(
                        "Row {} of batch {} failed: {}",
                        row.sequence_no,
                        batch_id,
                        reason
                    );
                    ledger.mark_status(row.id, OpStatus::Failed, Some(&reason))?;
                    result.failed.push(RowFailure {
                        sequence_no: row.sequence_no,
                        source: row.source.clone(),
                        error: reason,
                    });
                }
            }
        }

        tracing::info!(
            "Committed batch {}: {} succeeded, {} failed{}",
            batch_id,
            result.succeeded.len(),
            result.failed.len(),
            if result.cancelled { ", cancelled" } else { "" }
        );
        Ok(result)
    }

    /// Apply one row. Returns the effective destination (the soft-delete
    /// location for deletes) and, for metadata ops, the prior-state snapshot
    /// undo needs.
    fn execute_row(
        &self,
        profile_id: i64,
        row: &StagedRow,
    ) -> Result<(Option<PathBuf>, Option<Value>)> {
        if !row.source.exists() {
            return Err(EngineError::FilesystemConflict {
                path: row.source.clone(),
                reason: "source missing at commit time".to_string(),
            }
            .into());
        }

        match row.kind {
            OpKind::Move | OpKind::Rename => {
                let dest = row.dest.clone().ok_or_else(|| {
                    EngineError::InvalidOperation("move without destination".to_string())
                })?;
                if dest.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: dest,
                        reason: "destination already exists".to_string(),
                    }
                    .into());
                }
                fsops::move_file(&row.source, &dest)?;
                fsops::normalize_permissions(&dest);
                ItemStore::new(self.db).update_path(&row.source, &dest)?;
                Ok((Some(dest), None))
            }
            OpKind::Copy => {
                let dest = row.dest.clone().ok_or_else(|| {
                    EngineError::InvalidOperation("copy without destination".to_string())
                })?;
                if dest.exists() {
                    return Err(EngineError::FilesystemConflict {
                        path: dest,
                        reason: "destination already exists".to_string(),
                    }
                    .into());
                }
                fsops::copy_file(&row.source, &dest)?;
                fsops::normalize_permissions(&dest);
                Ok((Some(dest), None))
            }
            OpKind::Delete => {
                let relocated = fsops::soft_delete(&row.source, &self.config.soft_delete.path)?;
                ItemStore::new(self.db).update_path(&row.source, &relocated)?;
                Ok((Some(relocated), None))
            }
            OpKind::Categorize => {
                let category = payload_str(row, "category")?;
                let item_id = self.ensure_item(profile_id, row)?;
                let prior =
                    TagStore::new(self.db).assign_category(profile_id, item_id, &category)?;
                let detail = serde_json::json!({
                    "item_id": item_id,
                    "category": category,
                    "prior": prior,
                });
                Ok((None, Some(detail)))
            }
            OpKind::Tag => {
                let tag = payload_str(row, "tag")?;
                let value = row
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("value"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let item_id = self.ensure_item(profile_id, row)?;
                let prior = TagStore::new(self.db).set_tag(item_id, &tag, value.as_deref())?;
                let detail = serde_json::json!({
                    "item_id": item_id,
                    "tag": tag,
                    "value": value,
                    "prior_present": prior.is_some(),
                    "prior_value": prior.flatten(),
                });
                Ok((None, Some(detail)))
            }
        }
    }

    /// Resolve the stable item for a metadata row, registering it on first
    /// sighting under its folder's identifier.
    fn ensure_item(&self, profile_id: i64, row: &StagedRow) -> Result<i64> {
        let items = ItemStore::new(self.db);
        if let Some(record) = items.by_path(&row.source)? {
            return Ok(record.id);
        }

        let folder = row.source.parent().ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "{} has no parent folder",
                row.source.display()
            ))
        })?;
        let rel_name = row
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                EngineError::InvalidOperation(format!("{} has no filename", row.source.display()))
            })?;

        let identifier = IdentityStore::new(self.db, self.config.identity.width)
            .assign_or_get(profile_id, folder)?;
        items.observe(profile_id, &identifier, &rel_name, &row.source)
    }
}

fn payload_str(row: &StagedRow, key: &str) -> Result<String> {
    row.payload
        .as_ref()
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "{} row {} is missing its '{}' payload",
                row.kind.as_str(),
                row.sequence_no,
                key
            ))
            .into()
        })
}
