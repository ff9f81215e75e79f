//! querybee: a Prometheus exporter for warehouse query results.
//!
//! Gauge metrics are defined as SQL statements in plain query files. A
//! refresh loop re-runs every query on wall-clock-aligned boundaries, reloads
//! files whose modification time moved forward, and caches the results;
//! scrapes of `/metrics` only read the cached values.
//!
//! ## Modules
//!
//! * `config`: TOML configuration, validated with `validator`.
//! * `core`: query file parsing, placeholder substitution, the collector
//!   registry, the refresh orchestrator, the warehouse runner and the HTTP
//!   endpoints.
//! * `logger`: `tracing` subscriber setup with console and journald outputs.

pub mod config;
pub mod core;
pub mod logger;
