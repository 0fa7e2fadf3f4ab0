// src/logging.rs

//! Diagnostics for the `niftibatch` binary.
//!
//! Two output streams with different audiences:
//!
//! - stdout belongs to the user and to calling scripts. It carries the job
//!   banners, percent-complete lines and the JSON result of `run-task`, so
//!   nothing else may be written there.
//! - stderr receives `tracing` events from every module.
//!
//! The event level comes from `--log-level` when given. Otherwise
//! `NIFTIBATCH_LOG` is read, and a missing or unrecognised value means
//! `info`.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "NIFTIBATCH_LOG";

/// Install the stderr subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let level = cli_level.map(Level::from).unwrap_or_else(level_from_env);

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("initialising tracing subscriber: {e}"))
}

fn level_from_env() -> Level {
    std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or(Level::INFO)
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Case-insensitive; also accepts `warning`.
fn parse_level(value: &str) -> Option<Level> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    value.parse().ok()
}
