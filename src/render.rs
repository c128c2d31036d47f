//! Web-quality re-encoding and thumbnail caching.
//!
//! Rendering never touches originals: encoded bytes go to the caller and
//! thumbnails land in their own cache directory keyed by a path hash.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::config::ThumbnailConfig;

/// Lossy re-encoding seam: callers that need a different output format
/// supply their own encoder.
pub trait WebEncoder {
    fn encode(&self, img: &DynamicImage, quality: u8) -> Result<Vec<u8>>;
}

/// Default encoder: JPEG at a caller-specified quality.
pub struct JpegWebEncoder;

impl WebEncoder for JpegWebEncoder {
    fn encode(&self, img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let rgb = img.to_rgb8();
        let mut bytes = Vec::new();
        let encoder =
            JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .context("Failed to encode image")?;
        Ok(bytes)
    }
}

/// Re-encode an image for web delivery at the given quality (1-100).
/// The file on disk is left untouched.
pub fn compress_for_web(path: &Path, quality: u8) -> Result<Vec<u8>> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?;
    JpegWebEncoder.encode(&img, quality)
}

/// Manages thumbnail generation and caching.
pub struct ThumbnailCache {
    cache_dir: PathBuf,
    size: u32,
}

impl ThumbnailCache {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
            size: config.size,
        }
    }

    fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }

    /// Cache filename derived from a hash of the original path.
    fn cache_path(&self, original: &Path) -> PathBuf {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        original.to_string_lossy().hash(&mut hasher);
        let hash = hasher.finish();

        self.cache_dir.join(format!("{:016x}.jpg", hash))
    }

    pub fn get_cached_path(&self, original: &Path) -> Option<PathBuf> {
        let cache_path = self.cache_path(original);
        if cache_path.exists() {
            Some(cache_path)
        } else {
            None
        }
    }

    /// Generate and cache a thumbnail, returning the cached path.
    pub fn generate(&self, original: &Path) -> Result<PathBuf> {
        self.ensure_cache_dir()?;

        let cache_path = self.cache_path(original);
        if cache_path.exists() {
            return Ok(cache_path);
        }

        let img = image::open(original)
            .with_context(|| format!("Failed to open image {}", original.display()))?;
        let thumbnail = img.thumbnail(self.size, self.size);
        thumbnail.save(&cache_path)?;

        Ok(cache_path)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}
