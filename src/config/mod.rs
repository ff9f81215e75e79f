//! Application configuration.
//!
//! The configuration is a single TOML file with one table per concern:
//!
//! ```toml
//! [logger]
//! level = "info"
//!
//! [queries]
//! gauge_queries = ["/etc/querybee/gauges.sql"]
//! refresh_interval = 300
//!
//! [warehouse]
//! url = "postgres://exporter@warehouse:5432/analytics"
//!
//! [server]
//! listen_address = "0.0.0.0:9348"
//! ```
//!
//! It is loaded and validated once at startup, before the tracing subscriber
//! exists, and stays immutable afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{logger::LoggerConfig, queries::QueriesConfig, server::ServerConfig, warehouse::WarehouseConfig};

pub mod logger;
pub mod queries;
pub mod server;
pub mod warehouse;

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "QUERYBEE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/querybee/config.toml";

#[doc(hidden)]
#[macro_export]
macro_rules! __print_line {
    ($level:expr, $($arg:tt)*) => {
        println!("{}  {} {}",
            console::style(
                time::OffsetDateTime::now_utc()
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default()
            ).dim(),
            $level,
            format_args!($($arg)*)
        );
    };
}

/// Timestamped console output for use before the tracing subscriber is
/// initialized.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("INFO").green(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("WARN").yellow(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::__print_line!(console::style("ERROR").red(), $($arg)*)
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[validate(nested)]
    pub queries: QueriesConfig,

    #[validate(nested)]
    pub warehouse: WarehouseConfig,

    #[validate(nested)]
    pub server: ServerConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if no file is found or it cannot be read,
    /// parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// `QUERYBEE_CONFIG` if set, otherwise `/etc/querybee/config.toml` if it
    /// exists.
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Some(config_path) = std::env::var_os(CONFIG_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(format!(
            "No configuration file found. Set {} or create {}",
            CONFIG_ENV, DEFAULT_CONFIG_PATH
        )))
    }

    /// Loads and validates configuration from `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            toml::from_str(&config_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::logger::LogFormat;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(
            r#"
            [queries]
            gauge_queries = ["/etc/querybee/gauges.sql"]

            [warehouse]
            url = "postgres://exporter@localhost/analytics"
            "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.queries.refresh_interval, 300);
        assert_eq!(
            config.queries.gauge_queries,
            vec![PathBuf::from("/etc/querybee/gauges.sql")]
        );
        assert_eq!(config.warehouse.max_connections, 4);
        assert_eq!(config.warehouse.acquire_timeout, 30);
        assert_eq!(config.server.listen_address, "0.0.0.0:9348");
        assert_eq!(config.logger.level, "info");
    }

    #[test]
    fn full_config_is_read() {
        let file = write_config(
            r#"
            [logger]
            level = "debug"

            [logger.console]
            format = "json"

            [queries]
            gauge_queries = ["a.sql", "b.sql"]
            refresh_interval = 60

            [warehouse]
            url = "postgres://exporter@localhost/analytics"
            max_connections = 8

            [server]
            listen_address = "127.0.0.1:9100"
            "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.logger.level, "debug");
        assert_eq!(config.logger.console.format, LogFormat::Json);
        assert_eq!(config.queries.gauge_queries.len(), 2);
        assert_eq!(config.queries.refresh_interval, 60);
        assert_eq!(config.warehouse.max_connections, 8);
        assert_eq!(config.server.listen_address, "127.0.0.1:9100");
    }

    #[test]
    fn missing_query_files_fail_validation() {
        let file = write_config(
            r#"
            [warehouse]
            url = "postgres://exporter@localhost/analytics"
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn bad_listen_address_fails_validation() {
        let file = write_config(
            r#"
            [queries]
            gauge_queries = ["a.sql"]

            [warehouse]
            url = "postgres://exporter@localhost/analytics"

            [server]
            listen_address = "not-an-address"
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let file = write_config("[queries\ngauge_queries = ");

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
