//! Query file configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which query files to watch and how often to refresh them.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QueriesConfig {
    /// Files holding gauge metric definitions. At least one is required.
    #[validate(length(min = 1, message = "at least one query file is required"))]
    pub gauge_queries: Vec<PathBuf>,

    /// Refresh interval in seconds. Refreshes start on its wall-clock multiples.
    #[validate(range(min = 1))]
    pub refresh_interval: u64,
}

impl Default for QueriesConfig {
    fn default() -> Self {
        QueriesConfig {
            gauge_queries: Vec::new(),
            refresh_interval: 300,
        }
    }
}
