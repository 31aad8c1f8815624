//! # Gateway Resilience
//!
//! Protective building blocks for calls to external APIs:
//! - Fixed-window rate limiting per second, minute and day
//! - Response caching with per-entry TTLs, namespaced per API
//! - Circuit breaker with single-probe half-open recovery
//! - Retry policy with exponential backoff, re-checking the breaker per attempt
//! - Daily budget ledger with reservations and a global total
//! - Per-attempt timeouts
//!
//! All state is keyed by [`gateway_core::ApiId`] and guarded per API; no lock
//! spans more than one API.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod budget;
pub mod cache;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

// Re-export main types
pub use budget::{
    BudgetError, BudgetExceeded, BudgetLedger, BudgetScope, BudgetSnapshot, GlobalBudgetSnapshot,
    Reservation,
};
pub use cache::{CacheStats, ResponseCache};
pub use circuit_breaker::{
    BreakerPermit, BreakerRejected, BreakerSnapshot, CircuitBreaker, CircuitBreakerRegistry,
    CircuitState,
};
pub use rate_limiter::{Admission, Granularity, RateLimiter, WindowOccupancy};
pub use retry::{AttemptContext, RetryOutcome, RetryPolicy};
pub use timeout::{with_timeout, TimeoutManager};
