//! # Gateway Telemetry
//!
//! Structured logging setup and Prometheus metrics for the API resilience
//! gateway.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, tracing_level, LoggingError};
pub use metrics::Metrics;
