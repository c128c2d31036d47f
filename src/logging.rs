//! Engine logging setup.
//!
//! `Engine::open` wires this up once per process: journald where systemd is
//! available, a daily rolling file in the configured log directory otherwise.
//! Repeated initialization is a no-op, so embedding callers that install
//! their own subscriber first keep it.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

// Keeps the non-blocking writer alive for the life of the process.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Level filter from `SHUTTERSORT_LOG` (`debug`, `info`, `warn`, ...),
/// defaulting to `info`.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SHUTTERSORT_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Create the configured log directory and return its path.
pub fn ensure_log_dir(config: &LoggingConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.path)?;
    Ok(config.path.clone())
}

/// Install the global subscriber: journald on Linux when reachable, the
/// rolling file backend otherwise. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            if tracing_subscriber::registry()
                .with(env_filter())
                .with(journald)
                .try_init()
                .is_ok()
            {
                tracing::info!("Logging to journald");
            }
            return Ok(());
        }
    }

    init_with_file(config)
}

/// File-backed setup: daily rolling log in the configured directory.
pub fn init_with_file(config: &LoggingConfig) -> Result<()> {
    let dir = ensure_log_dir(config)?;

    let appender = tracing_appender::rolling::daily(&dir, "shuttersort.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = GUARD.set(guard);

    if tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .is_ok()
    {
        tracing::info!("Logging to {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_backend_creates_log_directory_and_reinit_is_a_noop() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            path: dir.path().join("nested").join("logs"),
        };

        init_with_file(&config).unwrap();
        assert!(config.path.is_dir());

        // A second init must not fail even though a subscriber is installed.
        init_with_file(&config).unwrap();
        tracing::info!("post-init event");
    }
}
