//! Retry with exponential backoff, checked against the circuit breaker.
//!
//! Each attempt needs a fresh breaker permit, so a circuit that opens part
//! way through a retry sequence stops it immediately. Transient errors are
//! retried up to the attempt ceiling; permanent errors end the sequence after
//! the attempt that raised them and never count against the breaker.

use crate::circuit_breaker::CircuitBreaker;
use crate::timeout::with_timeout;
use gateway_config::RetryConfig;
use gateway_core::{ApiId, Clock, ErrorKind, GatewayError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded
    Success {
        /// The value produced
        value: T,
        /// Attempts made, including the successful one
        attempts: u32,
    },
    /// The sequence ended on an error
    Failed {
        /// Classification of the final error
        kind: ErrorKind,
        /// Attempts made
        attempts: u32,
        /// The final error
        error: GatewayError,
    },
    /// The breaker refused an attempt
    CircuitOpen {
        /// Attempts made before the refusal
        attempts: u32,
    },
    /// The caller cancelled before any attempt produced a result
    Cancelled {
        /// Attempts started
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Attempts made
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::CircuitOpen { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// What one attempt runs under
pub struct AttemptContext<'a> {
    /// API being called
    pub api: ApiId,
    /// The API's breaker
    pub breaker: &'a Arc<CircuitBreaker>,
    /// Time source for breaker bookkeeping
    pub clock: &'a dyn Clock,
    /// Bound on a single attempt
    pub timeout: Duration,
    /// Caller's cancellation token
    pub cancel: &'a CancellationToken,
}

/// Retry policy with exponential backoff and jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay after failed attempt number `attempt` (1-based), without jitter
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.config.base_delay.as_secs_f64() * self.config.multiplier.powi(exponent);
        let capped = secs.min(self.config.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.config.max_delay)
    }

    /// Delay after failed attempt number `attempt` (1-based), with jitter,
    /// never above `max_delay`
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor).min(self.config.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// attempts, is refused by the breaker or is cancelled
    ///
    /// A result that is ready when cancellation is observed still counts.
    pub async fn execute<F, Fut, T>(&self, ctx: AttemptContext<'_>, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            if ctx.cancel.is_cancelled() {
                return RetryOutcome::Cancelled { attempts };
            }

            let permit = match ctx.breaker.try_acquire(ctx.clock.now()) {
                Ok(permit) => permit,
                Err(rejected) => {
                    debug!(
                        api = %ctx.api,
                        attempts,
                        state = %rejected.state,
                        "Breaker refused attempt"
                    );
                    return RetryOutcome::CircuitOpen { attempts };
                }
            };
            attempts += 1;

            let result = tokio::select! {
                biased;
                result = with_timeout(ctx.api, ctx.timeout, operation()) => result,
                () = ctx.cancel.cancelled() => {
                    permit.release();
                    debug!(api = %ctx.api, attempts, "Attempt cancelled");
                    return RetryOutcome::Cancelled { attempts };
                }
            };

            let error = match result {
                Ok(value) => {
                    permit.succeed();
                    if attempts > 1 {
                        debug!(api = %ctx.api, attempts, "Succeeded after retry");
                    }
                    return RetryOutcome::Success { value, attempts };
                }
                Err(error) => error,
            };

            match error.kind() {
                ErrorKind::Permanent => {
                    permit.release();
                    warn!(
                        api = %ctx.api,
                        attempts,
                        error = %error,
                        "Permanent error, not retrying"
                    );
                    return RetryOutcome::Failed {
                        kind: ErrorKind::Permanent,
                        attempts,
                        error,
                    };
                }
                ErrorKind::Transient => {
                    permit.fail(ctx.clock.now());

                    if attempts >= max_attempts {
                        warn!(
                            api = %ctx.api,
                            attempts,
                            error = %error,
                            "Retries exhausted"
                        );
                        return RetryOutcome::Failed {
                            kind: ErrorKind::Transient,
                            attempts,
                            error,
                        };
                    }

                    let delay = self.backoff_delay(attempts);
                    warn!(
                        api = %ctx.api,
                        attempt = attempts,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient error, retrying after backoff"
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = ctx.cancel.cancelled() => {
                            return RetryOutcome::Cancelled { attempts };
                        }
                    }
                }
            }
        }
    }
}
