//! Logging manager with one log file per run
//!
//! Provides dual-output logging:
//! - Console: INFO level with concise format
//! - File: configured level, one `<kind>-<stamp>.log` per backup or restore run

use crate::config::LoggingSettings;
use crate::utils::staging::run_stamp;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Prefixes of the per-run log files this tool writes
const RUN_LOG_PREFIXES: [&str; 2] = ["backup-", "restore-"];

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for log files
    pub log_directory: PathBuf,
    /// Log level for file output (console always uses INFO)
    pub log_level: Level,
}

impl LoggingConfig {
    /// Create from the `[logging]` section
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let level = match settings.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        Self {
            log_directory: settings.log_directory.clone(),
            log_level: level,
        }
    }
}

/// Path of the log file for a run of `kind` started at `started`
pub fn run_log_path(log_dir: &Path, kind: &str, started: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!("{}-{}.log", kind, run_stamp(started)))
}

/// Initialize logging with console and a per-run file
///
/// Returns a guard that must be kept alive for the duration of the program.
/// When the guard is dropped, any remaining logs are flushed to disk.
pub fn init_run_logging(config: &LoggingConfig, kind: &str) -> Result<LogGuard> {
    fs::create_dir_all(&config.log_directory).with_context(|| {
        format!("Failed to create log directory: {:?}", config.log_directory)
    })?;

    let path = run_log_path(&config.log_directory, kind, Utc::now());
    let file_name = path
        .file_name()
        .context("run log path has no file name")?
        .to_owned();
    let file_appender = tracing_appender::rolling::never(&config.log_directory, file_name);
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(config.log_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
        .with_filter(level_filter(Level::INFO));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard {
        path,
        _file_guard: file_guard,
    })
}

/// Initialize simple console-only logging (registry management, validation)
pub fn init_console_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second initialisation in the same process is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

/// Create a level filter for tracing layers; `RUST_LOG` wins when set
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

/// Remove run logs last modified more than `retention_days` ago
///
/// Returns how many files were removed.
pub fn expire_run_logs(log_dir: &Path, retention_days: u32) -> Result<usize> {
    let max_age = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?
        .filter_map(|entry| entry.ok())
    {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_run_log =
            name.ends_with(".log") && RUN_LOG_PREFIXES.iter().any(|p| name.starts_with(p));
        if !is_run_log {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified()).ok();
        if modified.map_or(false, |m| m < cutoff) {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::warn!("Failed to remove old log file {:?}: {}", entry.path(), e);
            } else {
                tracing::debug!("Removed old log file: {:?}", entry.path());
                removed += 1;
            }
        }
    }

    Ok(removed)
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any remaining logs to disk.
pub struct LogGuard {
    path: PathBuf,
    _file_guard: WorkerGuard,
}

impl LogGuard {
    /// The file this run logs to
    pub fn path(&self) -> &Path {
        &self.path
    }
}
