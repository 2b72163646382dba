//! Log setup: stderr always, plus a file when `CREATURE_LOG_DIR` is set.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Platform cache directory for logs, e.g. `~/.cache/creature/logs` on Linux.
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "creature")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/creature"))
        .join("logs")
}

/// Where file logs go: `CREATURE_LOG_DIR`, or the platform default when it is
/// set but empty. `None` when unset.
fn log_dir() -> Option<PathBuf> {
    let dir = std::env::var_os("CREATURE_LOG_DIR")?;
    if dir.is_empty() {
        Some(default_log_dir())
    } else {
        Some(PathBuf::from(dir))
    }
}

/// Installs the global subscriber. Keep the returned guard alive until exit
/// so buffered file lines are flushed.
pub fn setup_logging() -> Result<Option<WorkerGuard>> {
    let env_filter =
        || EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let Some(dir) = log_dir() else {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(None);
    };

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&dir, "creature.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    tracing::info!(log_dir = %dir.display(), "file logging enabled");
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_dir_ends_in_logs() {
        assert!(default_log_dir().ends_with("logs"));
    }
}
