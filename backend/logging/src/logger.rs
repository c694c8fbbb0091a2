//! Structured Logger
//!
//! Wraps `tracing` with a console layer and, when a log directory is given,
//! a JSON file layer rotated daily (`toolkit.log.YYYY-MM-DD`).

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "toolkit.log";

/// `RUST_LOG` wins over the configured level; an unparsable level falls back
/// to `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), level)
}

fn build_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initialize the global logger.
///
/// A second call is a no-op. Fails only if the log directory cannot be
/// created.
pub fn init_logger(log_dir: Option<&Path>, level: &str) -> Result<()> {
    let file_layer = match log_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .build(dir)
                .with_context(|| format!("failed to open log directory {}", dir.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(appender)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init();
    Ok(())
}
