//! Error taxonomy for the mutation engine.
//!
//! Row-level failures during commit/undo are not errors: they are recorded in
//! the structured batch results so callers see per-row detail. The variants
//! here cover constraint violations that abort a whole call.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A staged operation is malformed or points outside the configured
    /// folder roles of its profile.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Every identifier up to the configured width is already assigned
    /// within the profile.
    #[error("identifier space exhausted for profile {profile}: {max} identifiers in use")]
    IdentitySpaceExhausted { profile: String, max: u32 },

    /// One of the items already participates in an active pairing.
    #[error("pairing conflict: item {item_id} already belongs to an active pairing")]
    PairingConflict { item_id: i64 },

    /// The batch was never committed, or has already been fully reverted.
    #[error("nothing to undo for batch {batch_id}")]
    NothingToUndo { batch_id: String },

    /// Source missing or destination occupied at execution time.
    #[error("filesystem conflict at {path}: {reason}")]
    FilesystemConflict { path: PathBuf, reason: String },
}
