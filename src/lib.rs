//! Staged, reversible file-mutation engine for on-disk image collections.
//!
//! Nothing touches the filesystem until a reviewed batch is committed.
//! Matching and collision detection produce proposals, the staging ledger
//! records them, the commit executor applies them row by row, and the
//! processed log makes every committed batch undoable. Deletes are
//! relocations into a reserved location, never unlinks.

pub mod config;
pub mod db;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fsops;
pub mod history;
pub mod identity;
pub mod items;
pub mod ledger;
pub mod logging;
pub mod matcher;
pub mod profiles;
pub mod render;
pub mod tags;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
pub use executor::{CancelToken, CommitResult, RowFailure, RowOutcome};
pub use history::UndoResult;
pub use ledger::{BatchSummary, OpKind, OpStatus, ProposedOp, StagedRow};
pub use matcher::{MatchReport, ProposedPair};
