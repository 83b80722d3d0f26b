// src/logging.rs

//! Logging setup for `taskweave` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TASKWEAVE_LOG` environment variable, any `EnvFilter` directive string
//!    (e.g. "debug" or "taskweave::engine=trace,warn")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the run summary.

use anyhow::{Result, anyhow};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "TASKWEAVE_LOG";

/// Initialise global logging subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directives = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, directives.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// An unparsable `env` value falls back to `info` rather than failing startup.
fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::new(level_filter(lvl).to_string());
    }
    env.filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new(LevelFilter::INFO.to_string()))
}

fn level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_accepts_per_module_directives() {
        let filter = build_filter(None, Some("taskweave::engine=trace,warn"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(filter.to_string().contains("taskweave::engine=trace"));
    }

    #[test]
    fn cli_level_overrides_env() {
        let filter = build_filter(Some(LogLevel::Error), Some("taskweave=trace"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }

    #[test]
    fn missing_or_invalid_env_defaults_to_info() {
        for env in [None, Some(""), Some("taskweave=loud")] {
            let filter = build_filter(None, env);
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO), "{env:?}");
        }
    }

    #[test]
    fn cli_level_maps_directly() {
        assert_eq!(level_filter(LogLevel::Trace), LevelFilter::TRACE);
        assert_eq!(level_filter(LogLevel::Warn), LevelFilter::WARN);
    }
}
