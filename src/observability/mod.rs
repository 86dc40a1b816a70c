//! # Observability
//!
//! Prometheus metrics collection. Logging goes through `tracing` directly.

pub mod metrics;
