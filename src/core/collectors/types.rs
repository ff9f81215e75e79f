use std::fmt;

use super::error::ExporterError;

/// Result alias used across the query collection pipeline.
pub type ExporterResult<T> = std::result::Result<T, ExporterError>;

/// The kind of metric a collector exports.
///
/// Only gauges are produced today. The enum is non-exhaustive so a counter
/// kind can be added without breaking callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum MetricKind {
    /// Point-in-time value, replaced on every successful update.
    #[default]
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
        }
    }
}

/// A named query extracted from a query file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: String,
    pub query: String,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}
