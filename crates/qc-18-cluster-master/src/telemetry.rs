//! Logging setup for cluster master processes.
//!
//! Environment variables:
//! - `QC_LOG_LEVEL` or `RUST_LOG`: filter directive (default: info)
//! - `QC_JSON_LOGS`: JSON output when `true` or `1`

use std::env;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging setup errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Filter directive did not parse, or a subscriber is already installed.
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl LoggingConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Self {
        let log_level = env::var("QC_LOG_LEVEL")
            .or_else(|_| env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        let json_logs = env::var("QC_JSON_LOGS")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Self {
            log_level,
            json_logs,
        }
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Init(e.to_string()))?;

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::debug!(
        log_level = %config.log_level,
        json = config.json_logs,
        "[qc-18] Logging initialized"
    );
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_default_level() {
        assert_eq!(LoggingConfig::default().log_level, "info");
        assert!(!LoggingConfig::default().json_logs);
    }

    #[test]
    fn test_bad_directive_rejected() {
        let config = LoggingConfig {
            log_level: "qc_18=notalevel".to_string(),
            json_logs: false,
        };
        assert!(init_logging(&config).is_err());
    }
}
