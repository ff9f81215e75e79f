//! Warehouse-backed query runner.
//!
//! Queries run on a Postgres-compatible warehouse through an `sqlx` pool. A
//! query must return at least one row; the first column of the first row is
//! the gauge value.

use std::time::Duration;

use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Column, PgPool, Row, TypeInfo,
};
use tracing::{debug, instrument};

use super::collectors::{error::ExporterError, traits::QueryRunner, types::ExporterResult};
use crate::config::warehouse::WarehouseConfig;

/// [`QueryRunner`] backed by a connection pool.
#[derive(Debug, Clone)]
pub struct WarehouseRunner {
    pool: PgPool,
}

impl WarehouseRunner {
    /// Builds the pool without opening a connection.
    ///
    /// Only a malformed connection URL fails here. An unreachable warehouse
    /// shows up later as query errors on the affected metrics.
    pub fn connect_lazy(config: &WarehouseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect_lazy(&config.url)?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl QueryRunner for WarehouseRunner {
    #[instrument(skip(self, query), level = "debug")]
    async fn execute(&self, metric: &str, query: &str) -> ExporterResult<f64> {
        let row = sqlx::query(query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ExporterError::Query {
                metric: metric.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| ExporterError::InvalidValue {
                metric: metric.to_string(),
                reason: "query returned no rows".to_string(),
            })?;

        let value = row_value(metric, &row)?;
        debug!("Query for '{}' returned {}", metric, value);
        Ok(value)
    }
}

/// Reads the first column of `row` as a float.
fn row_value(metric: &str, row: &PgRow) -> ExporterResult<f64> {
    let invalid = |reason: String| ExporterError::InvalidValue {
        metric: metric.to_string(),
        reason,
    };

    let column = row
        .columns()
        .first()
        .ok_or_else(|| invalid("query returned no columns".to_string()))?;
    let type_name = column.type_info().name();

    let value = match type_name {
        "FLOAT8" => row.try_get::<Option<f64>, _>(0),
        "FLOAT4" => row.try_get::<Option<f32>, _>(0).map(|v| v.map(f64::from)),
        "INT8" => row.try_get::<Option<i64>, _>(0).map(|v| v.map(|v| v as f64)),
        "INT4" => row.try_get::<Option<i32>, _>(0).map(|v| v.map(f64::from)),
        "INT2" => row.try_get::<Option<i16>, _>(0).map(|v| v.map(f64::from)),
        other => {
            return Err(invalid(format!(
                "unsupported column type {} for '{}', cast it to FLOAT8",
                other,
                column.name()
            )))
        }
    }
    .map_err(|e| invalid(e.to_string()))?;

    value.ok_or_else(|| invalid(format!("column '{}' is NULL", column.name())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> WarehouseConfig {
        WarehouseConfig {
            url: url.to_string(),
            max_connections: 1,
            acquire_timeout: 1,
        }
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        assert!(WarehouseRunner::connect_lazy(&config("not a url")).is_err());
    }

    #[tokio::test]
    async fn unreachable_warehouse_is_a_query_error() {
        let runner = WarehouseRunner::connect_lazy(&config("postgres://user@127.0.0.1:1/warehouse"))
            .unwrap();

        let err = runner.execute("rows", "SELECT 1;").await.unwrap_err();
        assert!(matches!(err, ExporterError::Query { ref metric, .. } if metric == "rows"));
    }
}
