/// Collectors, their registry and the Prometheus exposition.
pub mod collectors;

/// Filesystem access used for change detection and reading query files.
pub mod fs;

/// Refresh cycle and wall-clock alignment.
pub mod orchestrator;

/// Query file parser.
pub mod parser;

/// Readiness state shared between the refresh loop and the HTTP server.
pub mod readiness;

/// `/metrics` and `/ready` endpoints.
pub mod server;

pub mod source;

/// Run-time placeholders in query text.
pub mod substitute;

/// Postgres-compatible warehouse runner.
pub mod warehouse;
