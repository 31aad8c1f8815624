//! # Gateway Orchestrator
//!
//! Composes the resilience components into one call pipeline per API:
//! cache lookup, rate-limit admission, budget reservation, then a
//! retry-wrapped call that re-checks the circuit breaker on every attempt.
//! Owns live/fallback mode selection and the operator controls.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod admin;
pub mod mode;
pub mod orchestrator;

pub use admin::{AdminError, ApiStatus, GatewayStatus};
pub use mode::{Mode, ModeSelector};
pub use orchestrator::{CallPolicy, Gateway, GatewayBuilder};
