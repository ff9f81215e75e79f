//! Warehouse connection configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Connection settings for the Postgres-compatible warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Connection URL, e.g. `postgres://exporter@warehouse:5432/analytics`.
    #[validate(length(min = 1))]
    pub url: String,

    /// Upper bound on pooled connections.
    #[validate(range(min = 1))]
    pub max_connections: u32,

    /// Seconds to wait for a free connection before a query fails.
    #[validate(range(min = 1))]
    pub acquire_timeout: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        WarehouseConfig {
            url: String::new(),
            max_connections: 4,
            acquire_timeout: 30,
        }
    }
}
