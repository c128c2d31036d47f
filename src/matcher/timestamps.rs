//! Capture timestamp extraction.
//!
//! EXIF `DateTimeOriginal` where present, filesystem mtime otherwise. EXIF
//! times carry no zone information; they are interpreted as UTC so deltas
//! between sibling folders shot on the same rig stay meaningful.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rayon::prelude::*;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Read the capture timestamp for a single file.
pub fn capture_time(path: &Path) -> Result<DateTime<Utc>> {
    if let Some(taken) = read_exif_taken_at(path) {
        return Ok(taken);
    }

    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

fn read_exif_taken_at(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    let field = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY)?;
    let raw = field.display_value().to_string();
    let raw = raw.trim_matches('"');

    // EXIF format first, dash-separated as a fallback
    for format in ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Collect timestamps for many files through a bounded worker pool.
///
/// Parallelism is confined to this read/transform step; results are merged
/// back into a single path-sorted vector so downstream matching stays
/// deterministic. Unreadable files are skipped with a warning.
pub fn collect_timestamps(paths: &[PathBuf], workers: usize) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()?;

    let mut stamps: Vec<(PathBuf, DateTime<Utc>)> = pool.install(|| {
        paths
            .par_iter()
            .filter_map(|path| match capture_time(path) {
                Ok(taken) => Some((path.clone(), taken)),
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    None
                }
            })
            .collect()
    });

    stamps.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(stamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn falls_back_to_mtime_without_exif() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        File::create(&path).unwrap();

        let taken = capture_time(&path).unwrap();
        let now = Utc::now();
        assert!((now - taken).num_seconds().abs() < 60);
    }

    #[test]
    fn collect_is_sorted_by_path() {
        let dir = tempdir().unwrap();
        let mut paths = Vec::new();
        for name in ["c.jpg", "a.jpg", "b.jpg"] {
            let p = dir.path().join(name);
            File::create(&p).unwrap();
            paths.push(p);
        }

        let stamps = collect_timestamps(&paths, 2).unwrap();
        assert_eq!(stamps.len(), 3);
        assert!(stamps.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("a.jpg");
        File::create(&present).unwrap();
        let paths = vec![present, dir.path().join("gone.jpg")];

        let stamps = collect_timestamps(&paths, 2).unwrap();
        assert_eq!(stamps.len(), 1);
    }
}
