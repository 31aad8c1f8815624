//! The gateway call pipeline.
//!
//! Every invocation runs the same fixed sequence:
//! 1. Cache lookup (a hit returns immediately, using no quota or budget)
//! 2. Mode selection (offline, no credentials or breaker ceiling route the
//!    call to the fallback provider)
//! 3. Rate-limit admission
//! 4. Budget reservation of the caller's cost estimate
//! 5. Retry-wrapped call, with breaker admission before every attempt
//! 6. On success, the reservation is settled at the reported cost and the
//!    response is cached
//!
//! No lock is held across the network call.

use crate::mode::{Mode, ModeSelector};
use gateway_config::{ConfigError, GatewayConfig};
use gateway_core::{
    ApiClient, ApiId, ApiRequest, CallOutcome, Clock, Cost, ErrorKind, FallbackProvider,
    FallbackReason, GatewayError, SystemClock,
};
use gateway_resilience::{
    Admission, AttemptContext, BudgetLedger, CircuitBreakerRegistry, RateLimiter, ResponseCache,
    RetryOutcome, RetryPolicy, TimeoutManager,
};
use gateway_telemetry::Metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallPolicy {
    /// How long a successful response stays cached. `None` uses the API's
    /// configured default; zero skips the cache write.
    pub cache_ttl: Option<Duration>,
    /// Amount reserved against the budget before the call is made
    pub cost_estimate: Cost,
}

impl CallPolicy {
    /// Default policy: configured cache TTL, zero estimate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL for this call
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Do not cache the response of this call
    #[must_use]
    pub fn uncached(self) -> Self {
        self.with_cache_ttl(Duration::ZERO)
    }

    /// Set the cost estimate reserved before the call
    #[must_use]
    pub fn with_cost_estimate(mut self, estimate: Cost) -> Self {
        self.cost_estimate = estimate;
        self
    }
}

/// The API resilience gateway
///
/// Share it behind an `Arc`; every method takes `&self` and per-API state is
/// guarded independently.
pub struct Gateway {
    pub(crate) config: GatewayConfig,
    pub(crate) clients: HashMap<ApiId, Arc<dyn ApiClient>>,
    pub(crate) fallback: Option<Arc<dyn FallbackProvider>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) limiter: RateLimiter,
    pub(crate) cache: ResponseCache,
    pub(crate) breakers: CircuitBreakerRegistry,
    pub(crate) ledger: BudgetLedger,
    pub(crate) retry: HashMap<ApiId, RetryPolicy>,
    pub(crate) timeouts: TimeoutManager,
    pub(crate) mode: ModeSelector,
    pub(crate) metrics: Option<Arc<Metrics>>,
}

impl Gateway {
    /// Start building a gateway from configuration
    #[must_use]
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Configuration the gateway was built with
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Time source used by every component
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Metrics sink, if one was attached
    #[must_use]
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Whether a live client is registered for the API
    #[must_use]
    pub fn has_client(&self, api: ApiId) -> bool {
        self.clients.contains_key(&api)
    }

    /// Whether a fallback provider is registered
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Invoke an API through the pipeline
    pub async fn invoke(&self, api: ApiId, request: &ApiRequest, policy: CallPolicy) -> CallOutcome {
        self.invoke_with_cancel(api, request, policy, &CancellationToken::new())
            .await
    }

    /// Invoke an API, aborting promptly when `cancel` fires
    ///
    /// A response that arrived before cancellation was observed is still
    /// charged and cached; attempts that never returned are not charged.
    #[instrument(
        skip(self, request, policy, cancel),
        fields(api = %api, method = request.method(), fingerprint = %request.fingerprint())
    )]
    pub async fn invoke_with_cancel(
        &self,
        api: ApiId,
        request: &ApiRequest,
        policy: CallPolicy,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let started = Instant::now();
        let outcome = self.run_pipeline(api, request, policy, cancel).await;
        self.observe(api, &outcome, started.elapsed());

        debug!(
            api = %api,
            outcome = outcome.label(),
            attempts = outcome.attempts(),
            "Invocation finished"
        );
        outcome
    }

    async fn run_pipeline(
        &self,
        api: ApiId,
        request: &ApiRequest,
        policy: CallPolicy,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let now = self.clock.now();
        let cache_config = &self.config.api(api).cache;

        if cache_config.enabled {
            let cached = self.cache.get(api, request, now);
            if let Some(metrics) = &self.metrics {
                metrics.record_cache_lookup(api, cached.is_some());
            }
            if let Some(payload) = cached {
                debug!(api = %api, "Served from cache");
                return CallOutcome::CacheHit { payload };
            }
        }

        let breaker = self.breakers.get_or_create(api);
        let client = self.clients.get(&api);
        let mode = self.mode.select(client.map(|client| &**client), &breaker, now);
        let client: &dyn ApiClient = match (mode, client) {
            (Mode::Live, Some(client)) => &**client,
            (Mode::Live, None) => return self.fall_back(api, request, FallbackReason::NoCredentials),
            (Mode::Fallback(reason), _) => return self.fall_back(api, request, reason),
        };

        if let Admission::Denied {
            retry_after,
            granularity,
        } = self.limiter.admit(api, now)
        {
            warn!(
                api = %api,
                granularity = granularity.as_str(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Call throttled"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_rate_limit_denial(api, granularity.as_str());
            }
            return CallOutcome::Throttled { retry_after };
        }

        let reservation = match self.ledger.reserve(api, policy.cost_estimate, now) {
            Ok(reservation) => reservation,
            Err(exceeded) => {
                warn!(
                    api = %api,
                    spent = %exceeded.spent,
                    critical = %exceeded.critical,
                    scope = ?exceeded.scope,
                    "Call denied by budget"
                );
                return CallOutcome::BudgetExceeded {
                    spent: exceeded.spent,
                    critical: exceeded.critical,
                };
            }
        };

        let ctx = AttemptContext {
            api,
            breaker: &breaker,
            clock: self.clock.as_ref(),
            timeout: self.timeouts.timeout_for(api),
            cancel,
        };
        let retry = self.retry_policy(api);

        match retry.execute(ctx, move || client.call(request)).await {
            RetryOutcome::Success {
                value: reply,
                attempts,
            } => {
                let finished = self.clock.now();
                let budget = reservation.settle(reply.cost, finished);

                let ttl = policy.cache_ttl.unwrap_or(cache_config.default_ttl);
                if cache_config.enabled && !ttl.is_zero() {
                    self.cache.put(api, request, reply.payload.clone(), ttl, finished);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_cache_write(api);
                    }
                }

                CallOutcome::Success {
                    payload: reply.payload,
                    cost: reply.cost,
                    attempts,
                    budget,
                }
            }
            RetryOutcome::Failed {
                kind,
                attempts,
                error,
            } => {
                reservation.release();
                CallOutcome::Failed {
                    kind,
                    attempts,
                    error,
                }
            }
            RetryOutcome::CircuitOpen { attempts } => {
                reservation.release();
                CallOutcome::CircuitOpen { attempts }
            }
            RetryOutcome::Cancelled { attempts } => {
                reservation.release();
                CallOutcome::Cancelled { attempts }
            }
        }
    }

    fn fall_back(&self, api: ApiId, request: &ApiRequest, reason: FallbackReason) -> CallOutcome {
        match &self.fallback {
            Some(provider) => {
                info!(api = %api, reason = %reason, "Routing call to fallback provider");
                CallOutcome::Fallback {
                    payload: provider.respond(api, request),
                    reason,
                }
            }
            None if reason == FallbackReason::BreakerCeiling => {
                CallOutcome::CircuitOpen { attempts: 0 }
            }
            None => {
                warn!(api = %api, reason = %reason, "Live path unavailable and no fallback provider");
                CallOutcome::Failed {
                    kind: ErrorKind::Permanent,
                    attempts: 0,
                    error: GatewayError::configuration(format!(
                        "{api} is unavailable ({reason}) and no fallback provider is registered"
                    )),
                }
            }
        }
    }

    fn retry_policy(&self, api: ApiId) -> RetryPolicy {
        self.retry.get(&api).cloned().unwrap_or_default()
    }

    fn observe(&self, api: ApiId, outcome: &CallOutcome, latency: Duration) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        metrics.record_outcome(api, outcome, latency);
        metrics.update_circuit_breaker(api, self.breakers.get_or_create(api).state());
        metrics.update_budget_spent(api, self.ledger.snapshot(api, self.clock.now()).spent);
    }
}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    config: GatewayConfig,
    clients: HashMap<ApiId, Arc<dyn ApiClient>>,
    fallback: Option<Arc<dyn FallbackProvider>>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl GatewayBuilder {
    /// Create a builder with the system clock and no clients
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
            fallback: None,
            clock: Arc::new(SystemClock),
            metrics: None,
        }
    }

    /// Register a live client; it serves the API it reports
    #[must_use]
    pub fn client(self, client: impl ApiClient) -> Self {
        self.shared_client(Arc::new(client))
    }

    /// Register a shared live client
    #[must_use]
    pub fn shared_client(mut self, client: Arc<dyn ApiClient>) -> Self {
        self.clients.insert(client.api(), client);
        self
    }

    /// Register the fallback provider
    #[must_use]
    pub fn fallback(mut self, provider: impl FallbackProvider) -> Self {
        self.fallback = Some(Arc::new(provider));
        self
    }

    /// Replace the time source
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a metrics sink
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and assemble the gateway
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn build(self) -> Result<Gateway, ConfigError> {
        self.config.validate_config()?;

        let mut limiter = RateLimiter::new();
        let mut cache = ResponseCache::new();
        let mut breakers = CircuitBreakerRegistry::new();
        let mut ledger = BudgetLedger::new(&self.config.budget);
        let mut retry = HashMap::new();
        let mut timeouts = TimeoutManager::default();

        for api in ApiId::ALL {
            let api_config = self.config.api(api);
            limiter = limiter.with_limits(api, api_config.rate_limit.clone());
            cache = cache.with_max_entries(api, api_config.cache.max_entries);
            breakers = breakers.with_config(api, api_config.circuit_breaker.clone());
            ledger = ledger.with_thresholds(api, api_config.budget);
            retry.insert(api, RetryPolicy::new(api_config.retry.clone()));
            timeouts = timeouts.with_api_timeout(api, api_config.timeout);
        }

        let mode = ModeSelector::new(&self.config.mode);

        info!(
            live_apis = ?self.clients.keys().collect::<Vec<_>>(),
            fallback = self.fallback.is_some(),
            offline = mode.is_offline(),
            "Gateway assembled"
        );

        Ok(Gateway {
            config: self.config,
            clients: self.clients,
            fallback: self.fallback,
            clock: self.clock,
            limiter,
            cache,
            breakers,
            ledger,
            retry,
            timeouts,
            mode,
            metrics: self.metrics,
        })
    }
}
