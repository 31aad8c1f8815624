//! Typed result of one gateway invocation.
//!
//! Callers receive a [`CallOutcome`] rather than a `Result`: throttling, an open
//! circuit, an exhausted budget and a failed call are all distinct variants so
//! business logic can pick its own degraded behavior for each.

use crate::error::{ErrorKind, GatewayError};
use crate::types::Cost;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Signal produced when a successful call is charged to the budget ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSignal {
    /// Total stays below the warning threshold (or was already past it)
    Ok,
    /// This charge moved the total across the warning threshold
    WarningCrossed,
    /// This charge moved the total across the critical threshold
    CriticalExceeded,
}

impl BudgetSignal {
    /// Label for logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::WarningCrossed => "warning",
            Self::CriticalExceeded => "critical",
        }
    }
}

/// Why a call was answered by the fallback provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Offline mode was requested by configuration or an operator
    Offline,
    /// No live client (or no credentials) is available for the API
    NoCredentials,
    /// The breaker has stayed away from Closed longer than the configured ceiling
    BreakerCeiling,
}

impl FallbackReason {
    /// Label for logs and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::NoCredentials => "no_credentials",
            Self::BreakerCeiling => "breaker_ceiling",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single gateway invocation
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Served from the response cache; no quota, budget or network used
    CacheHit {
        /// Cached payload
        payload: serde_json::Value,
    },
    /// Rejected by the rate limiter
    Throttled {
        /// Time until the blocking window(s) reset
        retry_after: Duration,
    },
    /// Rejected because the API's circuit is open (or its probe slot is taken)
    CircuitOpen {
        /// Attempts made before the circuit rejected the call
        attempts: u32,
    },
    /// Rejected because the day's budget for the API is exhausted
    BudgetExceeded {
        /// Amount spent today (including outstanding reservations)
        spent: Cost,
        /// Critical threshold in force
        critical: Cost,
    },
    /// Live call succeeded
    Success {
        /// Response payload
        payload: serde_json::Value,
        /// Cost charged for the call
        cost: Cost,
        /// Number of attempts used, including the successful one
        attempts: u32,
        /// Budget signal raised by the charge
        budget: BudgetSignal,
    },
    /// Live call failed
    Failed {
        /// Classification of the final error
        kind: ErrorKind,
        /// Number of attempts made
        attempts: u32,
        /// Final error
        error: GatewayError,
    },
    /// Answered locally by the fallback provider; free and uncounted
    Fallback {
        /// Synthetic payload
        payload: serde_json::Value,
        /// Why the live path was bypassed
        reason: FallbackReason,
    },
    /// Caller cancelled before any response arrived
    Cancelled {
        /// Attempts started before cancellation was observed
        attempts: u32,
    },
}

impl CallOutcome {
    /// Label for logs and metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CacheHit { .. } => "cache_hit",
            Self::Throttled { .. } => "throttled",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Success { .. } => "success",
            Self::Failed {
                kind: ErrorKind::Transient,
                ..
            } => "failed_transient",
            Self::Failed {
                kind: ErrorKind::Permanent,
                ..
            } => "failed_permanent",
            Self::Fallback { .. } => "fallback",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Payload carried by the outcome, if any
    #[must_use]
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::CacheHit { payload }
            | Self::Success { payload, .. }
            | Self::Fallback { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Consume the outcome, returning its payload if any
    #[must_use]
    pub fn into_payload(self) -> Option<serde_json::Value> {
        match self {
            Self::CacheHit { payload }
            | Self::Success { payload, .. }
            | Self::Fallback { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Check if the outcome is a live success
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attempts made against the live API (zero for short-circuited calls)
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::CircuitOpen { attempts }
            | Self::Cancelled { attempts } => *attempts,
            _ => 0,
        }
    }

    /// Suggested wait before retrying, for throttled calls
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
