//! Top-level engine facade.
//!
//! Owns the database handle and configuration and exposes the staged
//! workflow end to end: scan folders, propose matches, stage batches,
//! commit, undo. All mutation funnels through here; callers hold one
//! `Engine` and share it.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db::Database;
use crate::discovery::discover_images;
use crate::executor::{CancelToken, CommitExecutor, CommitResult};
use crate::history::{HistoryLog, LogEntry, UndoResult};
use crate::identity::{FolderIdentifier, IdentityStore};
use crate::items::{ItemRecord, ItemStore};
use crate::ledger::{BatchSummary, ProposedOp, StagedRow, StagingLedger};
use crate::matcher::{MatchReport, Matcher};
use crate::profiles::{Profile, ProfileStore};
use crate::render::{self, ThumbnailCache};
use crate::tags::{Pairing, TagStore};

pub struct Engine {
    config: Config,
    db: Database,
}

impl Engine {
    /// Open (or create) the database named by the config and wire up
    /// logging. Logging setup is a no-op when a subscriber is already
    /// installed.
    pub fn open(config: Config) -> Result<Self> {
        crate::logging::init(&config.logging)?;
        let db = Database::open(&config.db_path)?;
        db.initialize()?;
        Ok(Self { config, db })
    }

    /// In-memory engine, used by tests and dry runs.
    pub fn open_in_memory(config: Config) -> Result<Self> {
        let db = Database::open_in_memory()?;
        db.initialize()?;
        Ok(Self { config, db })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    pub fn create_profile(&self, name: &str) -> Result<i64> {
        ProfileStore::new(&self.db).find_or_create(name)
    }

    pub fn set_profile_role(&self, profile_id: i64, role: &str, path: &Path) -> Result<()> {
        ProfileStore::new(&self.db).set_role(profile_id, role, path)
    }

    pub fn profile(&self, name: &str) -> Result<Option<Profile>> {
        ProfileStore::new(&self.db).get(name)
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        ProfileStore::new(&self.db).list()
    }

    // ========================================================================
    // Discovery and identity
    // ========================================================================

    /// Scan a folder: register its identity, observe every image under it,
    /// and return the discovered paths in sorted order.
    pub fn scan_folder(&self, profile_id: i64, folder: &Path) -> Result<Vec<PathBuf>> {
        let paths = discover_images(
            folder,
            &self.config.discovery.image_extensions,
            self.config.discovery.recursive,
        )?;

        let identifier =
            IdentityStore::new(&self.db, self.config.identity.width).assign_or_get(profile_id, folder)?;
        let items = ItemStore::new(&self.db);
        for path in &paths {
            if let Some(name) = path.file_name() {
                items.observe(profile_id, &identifier, &name.to_string_lossy(), path)?;
            }
        }

        tracing::info!(
            "Scanned {} as {}: {} image(s)",
            folder.display(),
            identifier,
            paths.len()
        );
        Ok(paths)
    }

    pub fn folder_identity(&self, profile_id: i64, folder: &Path) -> Result<FolderIdentifier> {
        IdentityStore::new(&self.db, self.config.identity.width).assign_or_get(profile_id, folder)
    }

    pub fn retire_folder(&self, profile_id: i64, folder: &Path) -> Result<()> {
        IdentityStore::new(&self.db, self.config.identity.width).mark_removed(profile_id, folder)
    }

    pub fn list_folder_identities(&self, profile_id: i64) -> Result<Vec<(PathBuf, FolderIdentifier)>> {
        IdentityStore::new(&self.db, self.config.identity.width).list(profile_id)
    }

    pub fn item(&self, item_id: i64) -> Result<Option<ItemRecord>> {
        ItemStore::new(&self.db).get(item_id)
    }

    pub fn item_at(&self, path: &Path) -> Result<Option<ItemRecord>> {
        ItemStore::new(&self.db).by_path(path)
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Time-sync match two folders using the configured tolerance window.
    pub fn match_folders(&self, target_dir: &Path, control_dir: &Path) -> Result<MatchReport> {
        Matcher::new(self.config.matching.tolerance_secs, self.config.matching.workers)
            .match_folders(
                target_dir,
                control_dir,
                &self.config.discovery.image_extensions,
            )
    }

    // ========================================================================
    // Staging, commit, undo
    // ========================================================================

    pub fn stage(&self, profile_id: i64, batch_id: &str, ops: &[ProposedOp]) -> Result<usize> {
        StagingLedger::new(&self.db).stage(profile_id, batch_id, ops)
    }

    pub fn list_pending(&self, batch_id: &str) -> Result<Vec<StagedRow>> {
        StagingLedger::new(&self.db).list_pending(batch_id)
    }

    pub fn list_batch(&self, batch_id: &str) -> Result<Vec<StagedRow>> {
        StagingLedger::new(&self.db).list_batch(batch_id)
    }

    pub fn list_batches(&self, profile_id: i64) -> Result<Vec<BatchSummary>> {
        StagingLedger::new(&self.db).list_batches(profile_id)
    }

    pub fn discard(&self, batch_id: &str) -> Result<usize> {
        StagingLedger::new(&self.db).discard(batch_id)
    }

    pub fn commit(&self, batch_id: &str, cancel: &CancelToken) -> Result<CommitResult> {
        CommitExecutor::new(&self.db, &self.config).commit(batch_id, cancel)
    }

    pub fn undo(&self, batch_id: &str, cancel: &CancelToken) -> Result<UndoResult> {
        HistoryLog::new(&self.db).undo(&self.config, batch_id, cancel)
    }

    pub fn history(&self, batch_id: &str) -> Result<Vec<LogEntry>> {
        HistoryLog::new(&self.db).entries(batch_id)
    }

    // ========================================================================
    // Tags, categories, pairings
    // ========================================================================

    pub fn set_tag(&self, item_id: i64, tag: &str, value: Option<&str>) -> Result<()> {
        TagStore::new(&self.db).set_tag(item_id, tag, value)?;
        Ok(())
    }

    pub fn clear_tag(&self, item_id: i64, tag: &str) -> Result<()> {
        TagStore::new(&self.db).clear_tag(item_id, tag)
    }

    pub fn tags_of(&self, item_id: i64) -> Result<Vec<(String, Option<String>)>> {
        TagStore::new(&self.db).list_tags(item_id)
    }

    pub fn assign_category(&self, profile_id: i64, item_id: i64, category: &str) -> Result<Option<String>> {
        TagStore::new(&self.db).assign_category(profile_id, item_id, category)
    }

    pub fn category_of(&self, item_id: i64) -> Result<Option<String>> {
        TagStore::new(&self.db).category_of(item_id)
    }

    pub fn list_categories(&self, profile_id: i64) -> Result<Vec<String>> {
        TagStore::new(&self.db).list_categories(profile_id)
    }

    pub fn link_pair(&self, item_a: i64, item_b: i64) -> Result<i64> {
        TagStore::new(&self.db).link_pair(item_a, item_b)
    }

    pub fn unlink_pair(&self, item_id: i64) -> Result<bool> {
        TagStore::new(&self.db).unlink_pair(item_id)
    }

    pub fn active_pairing(&self, item_id: i64) -> Result<Option<Pairing>> {
        TagStore::new(&self.db).active_pairing(item_id)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    pub fn compress_for_web(&self, path: &Path, quality: u8) -> Result<Vec<u8>> {
        render::compress_for_web(path, quality)
    }

    pub fn thumbnail(&self, path: &Path) -> Result<PathBuf> {
        ThumbnailCache::new(&self.config.thumbnails).generate(path)
    }
}
