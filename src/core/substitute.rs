//! Placeholder substitution for query text.
//!
//! Queries may refer to values only known at run time:
//!
//! * `UNIX_START_TIME`: process start time, seconds since the Unix epoch.
//! * `REFRESH_RATE_SEC`: refresh interval in whole seconds.
//!
//! Replacement is literal text replacement of every occurrence.

use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use super::{
    collectors::{error::ExporterError, types::ExporterResult},
    parser::TERMINATOR,
};

pub const UNIX_START_TIME: &str = "UNIX_START_TIME";
pub const REFRESH_RATE_SEC: &str = "REFRESH_RATE_SEC";

/// Placeholder token → replacement value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    /// Builds the standard variable set from the process start time and the
    /// refresh interval.
    pub fn new(start: SystemTime, refresh: Duration) -> Self {
        let start_secs = start
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self::default()
            .with(UNIX_START_TIME, start_secs.to_string())
            .with(REFRESH_RATE_SEC, refresh.as_secs().to_string())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Replaces every known placeholder in `text`.
    pub fn apply(&self, text: &str) -> String {
        self.values
            .iter()
            .fold(text.to_string(), |acc, (name, value)| acc.replace(name, value))
    }
}

/// Splits `blob` into statements and fills in the placeholders of each.
///
/// Statements keep their terminator, are trimmed, and come back in the order
/// they appear. Empty statements are dropped.
pub fn substitute(blob: &str, vars: &Variables) -> Vec<String> {
    blob.split_inclusive(TERMINATOR)
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && *stmt != ";")
        .map(|stmt| vars.apply(stmt))
        .collect()
}

/// Substitutes `blob` and returns its only statement.
///
/// A metric is backed by exactly one query, and the warehouse runs each query
/// as a single prepared statement, so any other statement count is an error.
pub fn single_statement(metric: &str, blob: &str, vars: &Variables) -> ExporterResult<String> {
    let mut statements = substitute(blob, vars);
    match statements.len() {
        1 => Ok(statements.remove(0)),
        count => Err(ExporterError::StatementCount {
            metric: metric.to_string(),
            count,
        }),
    }
}
