use std::path::PathBuf;

use thiserror::Error;

/// Error type shared by the change detector, the parser, the query runners
/// and the collector registry.
///
/// Every variant is scoped to a single query file or a single metric. None of
/// them is fatal to the refresh loop: the orchestrator logs the error and
/// moves on to the next file or cycle.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// The query file could not be stat'ed. Retried on the next cycle.
    #[error("Failed to stat {path}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The query file could not be read while parsing it.
    #[error("Failed to read file {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The warehouse rejected the query or the connection failed.
    #[error("Query for {metric} failed: {reason}")]
    Query { metric: String, reason: String },

    /// The query ran but its result cannot be turned into a gauge value.
    #[error("Invalid result for {metric}: {reason}")]
    InvalidValue { metric: String, reason: String },

    /// A metric definition holds more or fewer than one SQL statement.
    #[error("Definition of {metric} holds {count} statements, expected exactly one")]
    StatementCount { metric: String, count: usize },

    /// The exposition layer refused the collector (name clash, bad name, ...).
    #[error("Failed to register collector for {metric}: {reason}")]
    Registration { metric: String, reason: String },

    /// The previous collector could not be removed, so it stays active.
    #[error("Failed to unregister previous collector for {0}")]
    Unregistration(String),

    /// No collector is registered under the requested name.
    #[error("Collector not found for: {0}")]
    CollectorNotFound(String),
}
