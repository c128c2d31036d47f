use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// List image files under a directory, filtered by the extension allow-list.
/// Files with other extensions are skipped, not errored. Output is sorted
/// by path so repeated scans of unchanged folders are identical.
pub fn discover_images(
    directory: &Path,
    extensions: &[String],
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();

    let mut walker = WalkDir::new(directory).follow_links(false);
    if !recursive {
        walker = walker.max_depth(1);
    }

    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();

        if path.is_file() {
            if let Some(ext) = path.extension() {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                if extensions.iter().any(|e| e.to_lowercase() == ext_lower) {
                    images.push(path.to_path_buf());
                }
            }
        }
    }

    images.sort();

    Ok(images)
}
