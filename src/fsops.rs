//! Filesystem primitives shared by the commit executor and undo.
//!
//! Moves prefer rename and fall back to copy + remove for cross-filesystem
//! paths. Deletes are relocations into the reserved soft-delete location,
//! never unlinks. Files that land in managed folders get their mode
//! normalized so other processes on shared-storage mounts can use them.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::EngineError;

/// Move a file, creating the destination's parent directories.
pub fn move_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    // Try rename first (fastest, same filesystem)
    match fs::rename(source, dest) {
        Ok(_) => Ok(()),
        Err(_) => {
            // Fall back to copy + delete for cross-filesystem moves
            fs::copy(source, dest)
                .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
            fs::remove_file(source)
                .with_context(|| format!("Failed to remove {} after copying", source.display()))?;
            Ok(())
        }
    }
}

/// Copy a file, creating the destination's parent directories.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::copy(source, dest)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
    Ok(())
}

/// Generate a unique name in the soft-delete location.
/// A global atomic counter keeps names unique even when multiple deletes
/// land within the same second.
fn soft_delete_name(soft_delete_dir: &Path, original: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = Utc::now().timestamp();
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let extension = original
        .extension()
        .map(|s| format!(".{}", s.to_string_lossy()))
        .unwrap_or_default();

    soft_delete_dir.join(format!("{}_{}_{}{}", stem, timestamp, seq, extension))
}

/// Relocate a file into the reserved soft-delete location and return where
/// it went. The original is recoverable until the location is purged.
pub fn soft_delete(source: &Path, soft_delete_dir: &Path) -> Result<PathBuf> {
    if !source.exists() {
        return Err(EngineError::FilesystemConflict {
            path: source.to_path_buf(),
            reason: "source missing at delete time".to_string(),
        }
        .into());
    }
    let dest = soft_delete_name(soft_delete_dir, source);
    move_file(source, &dest)?;
    Ok(dest)
}

/// Normalize a managed file to broadly readable/writable mode. Failures are
/// logged, not fatal: the file operation itself already succeeded.
pub fn normalize_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o666)) {
            tracing::warn!("Failed to normalize permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
