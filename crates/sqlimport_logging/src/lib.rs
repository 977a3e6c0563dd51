//! Shared logging setup for sqlimport binaries.
//!
//! Logs go to stderr and to a daily file under `~/.sqlimport/logs` (or
//! `$SQLIMPORT_HOME/logs`). Only the newest few files are kept.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable overriding the sqlimport home directory.
pub const HOME_ENV: &str = "SQLIMPORT_HOME";

const DEFAULT_LOG_FILTER: &str =
    "sqlimport=info,sqlimport_core=info,sqlimport_loader=info,sqlimport_mssql=info";
const VERBOSE_LOG_FILTER: &str =
    "sqlimport=debug,sqlimport_core=debug,sqlimport_loader=debug,sqlimport_mssql=debug";
const MAX_LOG_FILES: usize = 5;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Debug output on stderr
    pub verbose: bool,
    /// Overrides the default logs directory
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background log writer alive; drop it last to flush.
pub struct LogGuard {
    _file: WorkerGuard,
}

/// Daily `<app_name>.<date>.log` files in `dir`, oldest beyond five removed.
pub fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(app_name)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file for {} in {}", app_name, dir.display()))
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// `RUST_LOG` takes precedence over the built-in filters.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
            dir
        }
        None => ensure_logs_dir().context("Failed to ensure log directory")?,
    };
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender(&log_dir, config.app_name)?);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(VERBOSE_LOG_FILTER))
    } else {
        file_filter.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.verbose)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LogGuard { _file: guard })
}

/// The sqlimport home directory: `$SQLIMPORT_HOME` or `~/.sqlimport`.
pub fn sqlimport_home() -> Result<PathBuf> {
    if let Some(override_path) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".sqlimport"))
        .ok_or_else(|| anyhow!("Could not determine home directory; set {}", HOME_ENV))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(sqlimport_home()?.join("logs"))
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
