//! `tracing` setup shared by every pms binary.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! File output rolls daily under the log directory and old files are pruned
//! at startup.

use crate::{config::LoggingConfig, paths::AppDirs};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "pms.log";

/// Environment variable that replaces the configured level with a full
/// filter directive, e.g. `PMS_LOG=pms_mpd=trace`.
pub const LOG_ENV: &str = "PMS_LOG";

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(config, std::env::var(LOG_ENV).ok().as_deref())?;

    let log_dir = dirs.log_dir();
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let file_name = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    prune_logs(log_dir, file_name, config.max_log_files.max(1))?;

    let (file, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, file_name));
    let writer = if config.console {
        BoxMakeWriter::new(std::io::stderr.and(file))
    } else {
        BoxMakeWriter::new(file)
    };

    fmt()
        .with_env_filter(filter)
        .with_target(config.level.is_verbose())
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Filter from the override directive when present, else the configured level.
fn build_filter(config: &LoggingConfig, directive: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directive = directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(config.level.as_filter_directive());
    EnvFilter::try_new(directive).map_err(|source| LoggingError::ParseFilter {
        directive: directive.to_string(),
        source,
    })
}

/// Delete the oldest files named `<file_name>*` so at most `keep` remain.
/// Returns how many files were removed.
fn prune_logs(dir: &Path, file_name: &str, keep: usize) -> Result<usize, LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut logs: Vec<(SystemTime, PathBuf)> = listing
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_name))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    // Newest first; everything past `keep` goes.
    logs.sort_by(|a, b| b.0.cmp(&a.0));
    let stale: Vec<PathBuf> = logs.into_iter().skip(keep).map(|(_, path)| path).collect();
    for path in &stale {
        fs::remove_file(path).map_err(|source| LoggingError::Cleanup {
            path: path.clone(),
            source,
        })?;
    }
    Ok(stale.len())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter {directive:?}: {source}")]
    ParseFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
