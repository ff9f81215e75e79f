//! Logging configuration.
//!
//! ```toml
//! [logger]
//! level = "info"
//!
//! [logger.console]
//! format = "json"
//!
//! [logger.journald]
//! enabled = true
//! ```
//!
//! Console output is on by default; journald output is opt-in.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use validator::{Validate, ValidationError};

/// Console log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default filter when `RUST_LOG` is unset. Any `tracing` level name,
    /// case-insensitive.
    #[validate(custom(function = "validate_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: ConsoleConfig,

    #[validate(nested)]
    pub journald: JournaldConfig,
}

impl LoggerConfig {
    /// The configured level. Falls back to `INFO` if it does not parse, which
    /// validation already rules out.
    pub fn level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    Level::from_str(level).map(|_| ()).map_err(|_| {
        let mut err = ValidationError::new("invalid_log_level");
        err.message = Some(format!("Unknown log level '{}'", level).into());
        err
    })
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            console: ConsoleConfig::default(),
            journald: JournaldConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// Print the module path of each event.
    pub with_target: bool,
    pub with_thread_ids: bool,
    /// Log span close events with their busy and idle time. Each query file
    /// task runs in a `query_file` span, so this times every file per cycle.
    pub span_timings: bool,
    pub color: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_target: false,
            with_thread_ids: false,
            span_timings: false,
            color: true,
        }
    }
}

/// systemd journald output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct JournaldConfig {
    pub enabled: bool,

    /// `SYSLOG_IDENTIFIER` of the journal entries.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            identifier: env!("CARGO_PKG_NAME").into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_case_insensitive() {
        let config = LoggerConfig {
            level: "DEBUG".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.level(), Level::DEBUG);
    }

    #[test]
    fn unknown_level_is_rejected() {
        let config = LoggerConfig {
            level: "verbose".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_journald_identifier_is_rejected() {
        let config = LoggerConfig {
            journald: JournaldConfig {
                enabled: true,
                identifier: String::new(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn journald_identifier_defaults_to_crate_name() {
        assert_eq!(JournaldConfig::default().identifier, "querybee");
    }
}
