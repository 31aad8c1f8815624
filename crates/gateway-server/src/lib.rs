//! # Gateway Server
//!
//! Operator-facing HTTP surface for the API resilience gateway:
//! - Health and Prometheus metrics endpoints
//! - Read-only status of breakers, rate windows, budgets and caches
//! - Runtime controls (breaker reset, budget thresholds and override,
//!   offline mode, rate-window reset, cache invalidation)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use server::{serve, shutdown_signal, Server, ServerConfig, ServerError};
pub use state::AppState;
