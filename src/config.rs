use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub soft_delete: SoftDeleteConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Whether folder scans descend into subdirectories by default.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Tolerance window for time-sync matching, in seconds.
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: f64,

    /// Bounded worker pool size for timestamp extraction.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Zero-padding width of folder identifiers (3 -> id001_ .. id999_).
    #[serde(default = "default_identifier_width")]
    pub width: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftDeleteConfig {
    /// Reserved location deleted files are relocated into, never unlinked.
    #[serde(default = "default_soft_delete_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumb_cache_path")]
    pub path: PathBuf,

    #[serde(default = "default_thumb_size")]
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory the rolling log files are written to when journald is
    /// unavailable.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shuttersort")
        .join("shuttersort.db")
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "webp".to_string(),
        "bmp".to_string(),
        "tiff".to_string(),
    ]
}

fn default_tolerance_secs() -> f64 {
    60.0
}

fn default_workers() -> usize {
    8
}

fn default_identifier_width() -> u8 {
    3
}

fn default_soft_delete_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("shuttersort/.deleted")
}

fn default_thumb_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("shuttersort/thumbnails")
}

fn default_thumb_size() -> u32 {
    400
}

fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("shuttersort/logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            recursive: false,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance_secs: default_tolerance_secs(),
            workers: default_workers(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            width: default_identifier_width(),
        }
    }
}

impl Default for SoftDeleteConfig {
    fn default() -> Self {
        Self {
            path: default_soft_delete_path(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            path: default_thumb_cache_path(),
            size: default_thumb_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            discovery: DiscoveryConfig::default(),
            matching: MatchingConfig::default(),
            identity: IdentityConfig::default(),
            soft_delete: SoftDeleteConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shuttersort")
            .join("config.toml")
    }
}
