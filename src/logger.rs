//! Logging setup with daily rotating log files.
//!
//! Logs are stored at `<config dir>/report-stream/logs/` with 7-day retention.

use crate::config::app_dir;
use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer alive. Hold it for the program's lifetime.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize file and stderr logging. `RUST_LOG` overrides the `info` default.
pub fn init_logging() -> Result<LogGuard> {
    let log_dir = app_dir()
        .context("could not find config directory")?
        .join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log dir {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("report-stream")
        .filename_suffix("log")
        .max_log_files(7)
        .build(&log_dir)
        .context("build rolling log appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .try_init()
        .context("install tracing subscriber")?;

    tracing::info!(log_path = %log_dir.display(), "logging initialized");

    Ok(LogGuard { _guard: guard })
}
