//! Candidate producers: time-sync matching and collision detection.
//!
//! Everything in this module is read-only over the filesystem and the store.
//! Proposals are handed to the staging ledger; nothing is executed here.

pub mod collisions;
pub mod time_sync;
pub mod timestamps;

use anyhow::Result;
use std::path::Path;

use crate::discovery::discover_images;

pub use collisions::{detect_collisions, id_mapping, id_prefix, suffixed_name, Collision, NamedSource};
pub use time_sync::{match_by_time, FileStamp, MatchReport, ProposedPair};
pub use timestamps::{capture_time, collect_timestamps};

pub struct Matcher {
    pub tolerance_secs: f64,
    pub workers: usize,
}

impl Matcher {
    pub fn new(tolerance_secs: f64, workers: usize) -> Self {
        Self {
            tolerance_secs,
            workers,
        }
    }

    /// Run time-sync matching between two folders on disk.
    ///
    /// Timestamp extraction fans out over the bounded pool; the matching
    /// itself is pure, so rerunning against unchanged folders reproduces
    /// the same report.
    pub fn match_folders(
        &self,
        target_dir: &Path,
        control_dir: &Path,
        extensions: &[String],
    ) -> Result<MatchReport> {
        let target_paths = discover_images(target_dir, extensions, false)?;
        let control_paths = discover_images(control_dir, extensions, false)?;

        let target: Vec<FileStamp> = collect_timestamps(&target_paths, self.workers)?
            .into_iter()
            .map(|(path, taken_at)| FileStamp { path, taken_at })
            .collect();
        let control: Vec<FileStamp> = collect_timestamps(&control_paths, self.workers)?
            .into_iter()
            .map(|(path, taken_at)| FileStamp { path, taken_at })
            .collect();

        tracing::debug!(
            "Time-sync matching {} target files against {} control files (window {}s)",
            target.len(),
            control.len(),
            self.tolerance_secs
        );

        Ok(match_by_time(&target, &control, self.tolerance_secs))
    }
}
