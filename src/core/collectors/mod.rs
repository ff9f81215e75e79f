/// Query-backed collector and its cached gauge value.
pub mod collector;

/// Error type shared by the query pipeline.
pub mod error;

/// Exposition layer abstraction and the Prometheus-backed implementation.
pub mod exposition;

/// Owns the live collectors and serializes registration per metric name.
pub mod registry;

/// Core trait for warehouse query runners.
pub mod traits;

/// Shared result alias, metric kind and metric definition types.
pub mod types;

// ----------------------------------------------------------------------------
// Re-exports for public API
// ----------------------------------------------------------------------------

pub use collector::{QueryCollector, RegistrationState};
pub use error::ExporterError;
pub use exposition::{Exposition, PrometheusExposition};
pub use registry::{CollectorRegistry, RegisterOutcome};
pub use traits::QueryRunner;
pub use types::{ExporterResult, MetricDefinition, MetricKind};
