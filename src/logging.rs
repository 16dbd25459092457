//! Logging setup
//!
//! Three outputs: the console (honours `RUST_LOG`), a daily-rolling log file,
//! and a companion `*.error.log` that only receives errors.

use crate::{AssistantError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the background log writers alive
///
/// Dropping the guard flushes and closes the log files, so hold it for the
/// lifetime of the process.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
    log_file: PathBuf,
    error_file: PathBuf,
}

impl LoggingGuard {
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn error_file(&self) -> &Path {
        &self.error_file
    }
}

/// Map a configured level name onto a tracing level
///
/// Accepts the usual names case-insensitively plus `WARNING` and `CRITICAL`.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::TRACE),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARN" | "WARNING" => Ok(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::ERROR),
        "OFF" => Ok(LevelFilter::OFF),
        other => Err(AssistantError::Logging(format!("unknown log level '{}'", other))),
    }
}

/// Path of the error-only log next to `log_file`
pub fn error_log_path(log_file: &Path) -> PathBuf {
    let stem = log_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "virtual_assistant".to_string());
    log_file.with_file_name(format!("{}.error.log", stem))
}

/// Install the global subscriber
///
/// If a subscriber is already installed (tests, embedding), the existing one is
/// kept and the returned guard still owns the file writers.
pub fn setup_logging(level: &str, log_file: &Path) -> Result<LoggingGuard> {
    let level = parse_level(level)?;

    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let file_name = log_file
        .file_name()
        .ok_or_else(|| AssistantError::Logging(format!("invalid log file {}", log_file.display())))?;
    let error_file = error_log_path(log_file);
    let error_name = error_file
        .file_name()
        .ok_or_else(|| AssistantError::Logging("invalid error log file".to_string()))?;

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, file_name));
    let (error_writer, error_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, error_name));

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_filter(level),
        )
        .with(
            fmt::layer()
                .with_writer(error_writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        );

    if subscriber.try_init().is_err() {
        tracing::debug!("Global tracing subscriber already initialized, keeping it");
    }

    tracing::info!(
        level = %level,
        log_file = %log_file.display(),
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _guards: vec![file_guard, error_guard],
        log_file: log_file.to_path_buf(),
        error_file,
    })
}
