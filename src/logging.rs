// src/logging.rs

//! Logging setup for `jobdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. explicit `level` argument (if provided)
//! 2. `JOBDAG_LOG` environment variable (e.g. "info", "debug")
//! 3. `[logging].level` from the config file
//! 4. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for task output.

use anyhow::anyhow;
use tracing_subscriber::fmt;

use crate::config::LoggingConfig;
use crate::errors::Result;

/// Environment variable consulted when no explicit level is given.
pub const LOG_ENV: &str = "JOBDAG_LOG";

/// Initialise the global logging subscriber.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: Option<&str>, config: Option<&LoggingConfig>) -> Result<()> {
    let env_level = std::env::var(LOG_ENV).ok();
    let level = resolve_level(
        level,
        env_level.as_deref(),
        config.and_then(|c| c.level.as_deref()),
    );

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

/// First parseable level among argument, environment and config.
pub fn resolve_level(
    explicit: Option<&str>,
    env: Option<&str>,
    config: Option<&str>,
) -> tracing::Level {
    [explicit, env, config]
        .into_iter()
        .flatten()
        .find_map(parse_level_str)
        .unwrap_or(tracing::Level::INFO)
}

pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
