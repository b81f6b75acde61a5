//! Shared infrastructure for the bus tracking HTTP services.
//!
//! - [`AppState`]: the established database pool and event publisher
//! - [`health`]: liveness/readiness probe handlers
//! - [`metrics`]: Prometheus exporter for the library's metrics
//! - [`logging`]: structured JSON or text logging setup
//!
//! Connection and publishing logic lives in `bustrack-lib`; this crate only
//! wires it into axum.
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides in-memory pool and writer doubles.
//! Enable the `test-utils` feature to access it from dependent crates.

pub mod health;
pub mod logging;
pub mod metrics;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use health::{health_live, health_ready, HealthStatus, READY_PING_TIMEOUT};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{init_metrics, metrics_handler, prometheus_handle, MetricsConfig, MetricsError};
pub use state::AppState;
