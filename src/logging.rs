// src/logging.rs

//! `tracing` subscriber for the `taskwave` binary.
//!
//! The filter comes from `--log-level` when given, otherwise from the
//! `TASKWAVE_LOG` environment variable, which accepts full `EnvFilter`
//! directives such as `taskwave::engine=debug,info`. Without either, `info`
//! is used. Output goes to stderr; stdout is reserved for the plan and the
//! summary.

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKWAVE_LOG";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// An invalid `TASKWAVE_LOG` value falls back to `info` instead of failing
/// startup.
fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_directive());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: EnvFilter) -> String {
        filter.to_string().to_lowercase()
    }

    #[test]
    fn cli_flag_wins_over_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(render(filter), "debug");
    }

    #[test]
    fn environment_accepts_directives() {
        let filter = build_filter(None, Some("taskwave::engine=trace,warn"));
        let rendered = render(filter);
        assert!(rendered.contains("taskwave::engine=trace"));
        assert!(rendered.contains("warn"));
    }

    #[test]
    fn missing_or_blank_environment_means_info() {
        assert_eq!(render(build_filter(None, None)), "info");
        assert_eq!(render(build_filter(None, Some("  "))), "info");
    }
}
