//! # Gateway Core
//!
//! Shared vocabulary for the API resilience gateway:
//! - API identifiers, normalized requests and fingerprints
//! - Monetary costs in minor units
//! - Error classification (transient vs permanent)
//! - The typed [`CallOutcome`] returned to callers
//! - Client and fallback contracts, and the shared clock

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod clock;
pub mod error;
pub mod outcome;
pub mod types;

// Re-export main types
pub use client::{ApiClient, ApiReply, FallbackProvider};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use outcome::{BudgetSignal, CallOutcome, FallbackReason};
pub use types::{ApiId, ApiRequest, Cost, Fingerprint, ValidationError};
