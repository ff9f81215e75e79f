use super::types::ExporterResult;

/// Executes a single query against the warehouse.
///
/// This is the only capability the collectors need from a warehouse client.
/// Any client that can turn query text into one number can back a collector,
/// which is also how the tests swap in scripted runners.
///
/// `metric` is passed along only so errors can name the metric they belong to.
#[async_trait::async_trait]
pub trait QueryRunner: Send + Sync + 'static {
    /// Runs `query` and returns the resulting gauge value.
    async fn execute(&self, metric: &str, query: &str) -> ExporterResult<f64>;
}
