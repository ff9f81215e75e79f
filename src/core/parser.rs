//! Query file parser.
//!
//! A query file is plain text. Lines starting with `--` are comments, except
//! the metric annotation `-- MetricName:<name>` which names the statement that
//! follows it. Statements may span several lines and end with `;`:
//!
//! ```text
//! -- Daily active users.
//! -- MetricName: daily_active_users
//! SELECT COUNT(DISTINCT user_id)
//! FROM events
//! WHERE ts > NOW() - INTERVAL '1 day';
//! ```
//!
//! Each metric is backed by exactly one statement. The parser commits at the
//! first terminator, so a line such as `SELECT 1; SELECT 2;` yields one
//! definition holding two statements; such a definition is rejected with
//! [`ExporterError::StatementCount`] when it is loaded, because the warehouse
//! runs every query as a single prepared statement.
//!
//! The parser is permissive. A statement with no annotation in
//! front of it is committed under the empty name, and a second annotation
//! before the terminator renames the whole pending statement. Neither case is
//! an error; [`definitions`] drops the empty-named entry.

use std::{collections::HashMap, path::Path};

use tracing::{debug, trace};

use super::{
    collectors::{error::ExporterError, types::ExporterResult, types::MetricDefinition},
    fs::FileSystem,
};

/// Prefix of comment lines.
pub const COMMENT_PREFIX: &str = "--";

/// Prefix of the metric name annotation.
pub const METRIC_NAME_PREFIX: &str = "-- MetricName:";

/// Statement terminator.
pub const TERMINATOR: char = ';';

/// Extracts metric name → query text pairs from query file contents.
///
/// Every line of a statement is trimmed and followed by a single space, so
/// `"SELECT 1;"` is returned as `"SELECT 1; "`. The text is not trimmed again.
pub fn parse(contents: &str) -> HashMap<String, String> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();
    let mut current_query = String::new();

    for line in contents.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix(METRIC_NAME_PREFIX) {
            current_metric = name.trim().to_string();
            continue;
        }

        if line.starts_with(COMMENT_PREFIX) || line.is_empty() {
            continue;
        }

        current_query.push_str(line);
        current_query.push(' ');

        if line.ends_with(TERMINATOR) {
            trace!("Parsed query for metric '{}'", current_metric);
            metrics.insert(
                std::mem::take(&mut current_metric),
                std::mem::take(&mut current_query),
            );
        }
    }

    metrics
}

/// Reads `path` through `fs` and parses it.
pub async fn parse_file(fs: &dyn FileSystem, path: &Path) -> ExporterResult<HashMap<String, String>> {
    let contents = fs
        .read_to_string(path)
        .await
        .map_err(|source| ExporterError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(parse(&contents))
}

/// Turns a parsed mapping into metric definitions, sorted by name.
///
/// Statements committed without a metric name are dropped here.
pub fn definitions(metrics: HashMap<String, String>) -> Vec<MetricDefinition> {
    let mut defs: Vec<MetricDefinition> = metrics
        .into_iter()
        .filter_map(|(name, query)| {
            if name.is_empty() {
                debug!("Dropping query without a metric name: {}", query.trim());
                None
            } else {
                Some(MetricDefinition::new(name, query))
            }
        })
        .collect();

    defs.sort_by(|a, b| a.name.cmp(&b.name));
    defs
}
