//! Circuit breaker pattern implementation
//!
//! Provides failure isolation per API. The breaker has three states:
//! - Closed: calls pass through; consecutive failures are counted
//! - Open: calls are rejected without touching the network
//! - HalfOpen: a single probe at a time tests whether the API recovered
//!
//! Callers obtain a [`BreakerPermit`] before each attempt and settle it with
//! the attempt's result. A permit that is dropped unsettled (for example when
//! the caller is cancelled) gives its probe slot back without counting as
//! either a success or a failure.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_config::CircuitBreakerConfig;
use gateway_core::clock::elapsed;
use gateway_core::ApiId;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - calls pass through
    Closed,
    /// Failures exceeded threshold - calls are rejected
    Open,
    /// Testing recovery - one probe at a time
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding for gauges (0 closed, 1 half-open, 2 open)
    #[must_use]
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Why a permit was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerRejected {
    /// State that caused the rejection
    pub state: CircuitState,
    /// Time until a probe may be admitted, when known
    pub retry_after: Option<Duration>,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Consecutive failures counted while Closed (or the one that reopened it)
    pub consecutive_failures: u32,
    /// Consecutive probe successes while HalfOpen
    pub consecutive_successes: u32,
    /// When the circuit last opened
    pub opened_at: Option<DateTime<Utc>>,
    /// When the circuit left Closed; cleared only when it closes again
    pub unhealthy_since: Option<DateTime<Utc>>,
    /// Whether a HalfOpen probe is outstanding
    pub probe_in_flight: bool,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<DateTime<Utc>>,
    unhealthy_since: Option<DateTime<Utc>>,
    probe_in_flight: bool,
    /// Bumped on every transition so permits from an earlier state are ignored
    generation: u64,
}

impl BreakerInner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            unhealthy_since: None,
            probe_in_flight: false,
            generation: 0,
        }
    }
}

/// Circuit breaker for one API
pub struct CircuitBreaker {
    api: ApiId,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new, closed circuit breaker
    #[must_use]
    pub fn new(api: ApiId, config: CircuitBreakerConfig) -> Self {
        Self {
            api,
            config,
            inner: Mutex::new(BreakerInner::closed()),
        }
    }

    /// API guarded by this breaker
    #[must_use]
    pub fn api(&self) -> ApiId {
        self.api
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask for permission to make one attempt
    ///
    /// An Open circuit whose recovery timeout has elapsed moves to HalfOpen and
    /// hands out the probe permit. While a probe is outstanding every other
    /// caller is rejected as if the circuit were Open.
    ///
    /// # Errors
    /// Returns `BreakerRejected` when the attempt must not be made
    pub fn try_acquire(self: &Arc<Self>, now: DateTime<Utc>) -> Result<BreakerPermit, BreakerRejected> {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Ok(self.permit(inner.generation, false)),
            CircuitState::Open => {
                let opened_at = inner.opened_at.unwrap_or(now);
                let open_for = elapsed(opened_at, now);

                if open_for >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.probe_in_flight = true;
                    inner.generation += 1;
                    info!(api = %self.api, "Circuit breaker half-open, admitting probe");
                    Ok(self.permit(inner.generation, true))
                } else {
                    Err(BreakerRejected {
                        state: CircuitState::Open,
                        retry_after: Some(self.config.recovery_timeout - open_for),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(BreakerRejected {
                        state: CircuitState::HalfOpen,
                        retry_after: None,
                    })
                } else {
                    inner.probe_in_flight = true;
                    debug!(api = %self.api, "Circuit breaker admitting next probe");
                    Ok(self.permit(inner.generation, true))
                }
            }
        }
    }

    /// Whether an attempt made at `now` would be admitted, without taking a
    /// permit
    #[must_use]
    pub fn would_admit(&self, now: DateTime<Utc>) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner
                .opened_at
                .map_or(true, |at| elapsed(at, now) >= self.config.recovery_timeout),
            CircuitState::HalfOpen => !inner.probe_in_flight,
        }
    }

    fn permit(self: &Arc<Self>, generation: u64, probe: bool) -> BreakerPermit {
        BreakerPermit {
            breaker: Arc::clone(self),
            generation,
            probe,
            settled: false,
        }
    }

    fn on_success(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_successes += 1;
                debug!(
                    api = %self.api,
                    successes = inner.consecutive_successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success in half-open state"
                );

                if inner.consecutive_successes >= self.config.success_threshold {
                    Self::close(&mut inner);
                    info!(api = %self.api, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                debug!(
                    api = %self.api,
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker recorded failure"
                );

                if inner.consecutive_failures >= self.config.failure_threshold {
                    Self::open(&mut inner, now);
                    warn!(
                        api = %self.api,
                        failures = inner.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_failures += 1;
                Self::open(&mut inner, now);
                warn!(api = %self.api, "Circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    fn on_release(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation && inner.state == CircuitState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn open(inner: &mut BreakerInner, now: DateTime<Utc>) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.consecutive_successes = 0;
        inner.probe_in_flight = false;
        inner.unhealthy_since.get_or_insert(now);
        inner.generation += 1;
    }

    fn close(inner: &mut BreakerInner) {
        let generation = inner.generation + 1;
        *inner = BreakerInner::closed();
        inner.generation = generation;
    }

    /// Force the breaker back to Closed, clearing all counters
    pub fn force_reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        Self::close(&mut inner);
        info!(api = %self.api, previous = %previous, "Circuit breaker force-reset");
    }

    /// How long the breaker has been away from Closed
    #[must_use]
    pub fn unhealthy_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.inner
            .lock()
            .unhealthy_since
            .map(|since| elapsed(since, now))
    }

    /// Current counters and timestamps
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            opened_at: inner.opened_at,
            unhealthy_since: inner.unhealthy_since,
            probe_in_flight: inner.probe_in_flight,
        }
    }
}

/// Permission to make one attempt
///
/// Settle it with [`succeed`](Self::succeed), [`fail`](Self::fail) or
/// [`release`](Self::release). Dropping it unsettled is the same as
/// releasing it.
#[must_use = "an unsettled permit records nothing"]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl BreakerPermit {
    /// Whether this permit is a HalfOpen probe
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// Record a successful attempt
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    /// Record a failure that counts against the API's health
    pub fn fail(mut self, now: DateTime<Utc>) {
        self.settled = true;
        self.breaker.on_failure(self.generation, now);
    }

    /// Give the permit back without recording an outcome
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.on_release(self.generation);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.on_release(self.generation);
        }
    }
}

impl fmt::Debug for BreakerPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("api", &self.breaker.api)
            .field("probe", &self.probe)
            .finish()
    }
}

/// Lazily created breakers, one per API
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    configs: HashMap<ApiId, CircuitBreakerConfig>,
    breakers: DashMap<ApiId, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry where every API uses the default thresholds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure thresholds for one API
    #[must_use]
    pub fn with_config(mut self, api: ApiId, config: CircuitBreakerConfig) -> Self {
        self.configs.insert(api, config);
        self
    }

    /// Get or create the breaker for an API
    #[must_use]
    pub fn get_or_create(&self, api: ApiId) -> Arc<CircuitBreaker> {
        let entry = self.breakers.entry(api).or_insert_with(|| {
            let config = self.configs.get(&api).cloned().unwrap_or_default();
            Arc::new(CircuitBreaker::new(api, config))
        });
        Arc::clone(entry.value())
    }

    /// Snapshot of an API's breaker; a breaker never used reads as Closed
    #[must_use]
    pub fn snapshot(&self, api: ApiId) -> BreakerSnapshot {
        self.get_or_create(api).snapshot()
    }

    /// Force-reset an API's breaker
    pub fn reset(&self, api: ApiId) {
        self.get_or_create(api).force_reset();
    }
}
