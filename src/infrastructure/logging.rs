//! Logging setup
//!
//! Console output always; with `logging.directory` set, a daily-rolling
//! JSON file as well. `RUST_LOG` overrides the configured level.

use super::config::LoggingConfig;
use crate::{HarnessError, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// Returns the appender guards, which must be kept alive for the duration
/// of the program or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(env_directives.as_deref(), &config.level)?;
    let mut guards = Vec::new();

    let file_layer = match &config.directory {
        Some(dir) => {
            let (appender, guard) = create_appender(dir, "harness")?;
            guards.push(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .json(),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| HarnessError::Logging(e.to_string()))?;

    match &config.directory {
        Some(dir) => tracing::info!("Logging initialized. Log files in {}", dir.display()),
        None => tracing::info!("Logging initialized"),
    }

    Ok(guards)
}

/// `RUST_LOG` directives if set and valid, otherwise the configured level
fn build_filter(env_directives: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(filter) = env_directives.and_then(|d| EnvFilter::try_new(d).ok()) {
        return Ok(filter);
    }
    EnvFilter::try_new(level)
        .map_err(|e| HarnessError::Logging(format!("invalid log level '{}': {}", level, e)))
}

/// Create a rolling file appender
fn create_appender(dir: &Path, name: &str) -> Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, name);
    Ok(tracing_appender::non_blocking(appender))
}
