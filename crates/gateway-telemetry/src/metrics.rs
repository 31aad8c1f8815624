//! Prometheus metrics for the gateway.
//!
//! Provides metrics for:
//! - Call outcomes, attempts and latency per API
//! - Rate-limit denials and cache operations
//! - Circuit breaker state and budget spend

use gateway_config::MetricsConfig;
use gateway_core::{ApiId, BudgetSignal, CallOutcome, Cost, FallbackReason};
use gateway_resilience::CircuitState;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tracing::{debug, error, info};

const NAMESPACE: &str = "api_gateway";

/// Main metrics registry and collectors
pub struct Metrics {
    /// Prometheus registry
    registry: Registry,
    /// Calls by terminal outcome
    calls_total: CounterVec,
    /// Attempts per live call
    call_attempts: HistogramVec,
    /// End-to-end call latency
    call_duration: HistogramVec,
    /// Rate-limit denials by blocking window
    rate_limit_denials: CounterVec,
    /// Cache hits/misses
    cache_operations: CounterVec,
    /// Circuit breaker state gauge
    circuit_breaker_state: IntGaugeVec,
    /// Today's spend per API, minor units
    budget_spent: IntGaugeVec,
    /// Budget threshold crossings
    budget_signals: CounterVec,
    /// Calls answered by the fallback provider
    fallback_total: CounterVec,
}

impl Metrics {
    /// Create a new metrics instance
    ///
    /// # Errors
    /// Returns error if metrics cannot be registered
    pub fn new(config: &MetricsConfig) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let calls_total = CounterVec::new(
            Opts::new("calls_total", "Gateway invocations by outcome").namespace(NAMESPACE),
            &["api", "outcome"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let call_attempts = HistogramVec::new(
            HistogramOpts::new("call_attempts", "Network attempts per live call")
                .namespace(NAMESPACE)
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 10.0]),
            &["api"],
        )?;
        registry.register(Box::new(call_attempts.clone()))?;

        let call_duration = HistogramVec::new(
            HistogramOpts::new("call_duration_seconds", "Invocation latency in seconds")
                .namespace(NAMESPACE)
                .buckets(config.latency_buckets.clone()),
            &["api"],
        )?;
        registry.register(Box::new(call_duration.clone()))?;

        let rate_limit_denials = CounterVec::new(
            Opts::new("rate_limit_denials_total", "Calls denied by the rate limiter")
                .namespace(NAMESPACE),
            &["api", "granularity"],
        )?;
        registry.register(Box::new(rate_limit_denials.clone()))?;

        let cache_operations = CounterVec::new(
            Opts::new("cache_operations_total", "Cache lookups and writes").namespace(NAMESPACE),
            &["api", "result"],
        )?;
        registry.register(Box::new(cache_operations.clone()))?;

        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Circuit breaker state (0=closed, 1=half-open, 2=open)",
            )
            .namespace(NAMESPACE),
            &["api"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let budget_spent = IntGaugeVec::new(
            Opts::new("budget_spent_minor", "Spend charged today, in minor units")
                .namespace(NAMESPACE),
            &["api"],
        )?;
        registry.register(Box::new(budget_spent.clone()))?;

        let budget_signals = CounterVec::new(
            Opts::new("budget_signals_total", "Budget threshold crossings").namespace(NAMESPACE),
            &["api", "level"],
        )?;
        registry.register(Box::new(budget_signals.clone()))?;

        let fallback_total = CounterVec::new(
            Opts::new("fallback_total", "Calls answered by the fallback provider")
                .namespace(NAMESPACE),
            &["api", "reason"],
        )?;
        registry.register(Box::new(fallback_total.clone()))?;

        info!("Metrics initialized");

        Ok(Self {
            registry,
            calls_total,
            call_attempts,
            call_duration,
            rate_limit_denials,
            cache_operations,
            circuit_breaker_state,
            budget_spent,
            budget_signals,
            fallback_total,
        })
    }

    /// Record a finished invocation
    pub fn record_outcome(&self, api: ApiId, outcome: &CallOutcome, latency: Duration) {
        let api_label = api.as_str();

        self.calls_total
            .with_label_values(&[api_label, outcome.label()])
            .inc();
        self.call_duration
            .with_label_values(&[api_label])
            .observe(latency.as_secs_f64());

        let attempts = outcome.attempts();
        if attempts > 0 {
            self.call_attempts
                .with_label_values(&[api_label])
                .observe(f64::from(attempts));
        }

        match outcome {
            CallOutcome::Fallback { reason, .. } => self.record_fallback(api, *reason),
            CallOutcome::Success { budget, .. } if *budget != BudgetSignal::Ok => {
                self.budget_signals
                    .with_label_values(&[api_label, budget.as_str()])
                    .inc();
            }
            _ => {}
        }

        debug!(
            api = api_label,
            outcome = outcome.label(),
            latency_ms = latency.as_millis() as u64,
            "Call metrics recorded"
        );
    }

    /// Record a rate-limit denial
    pub fn record_rate_limit_denial(&self, api: ApiId, granularity: &str) {
        self.rate_limit_denials
            .with_label_values(&[api.as_str(), granularity])
            .inc();
    }

    /// Record cache lookup result
    pub fn record_cache_lookup(&self, api: ApiId, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_operations
            .with_label_values(&[api.as_str(), result])
            .inc();
    }

    /// Record a cache write
    pub fn record_cache_write(&self, api: ApiId) {
        self.cache_operations
            .with_label_values(&[api.as_str(), "write"])
            .inc();
    }

    /// Record a call answered by the fallback provider
    pub fn record_fallback(&self, api: ApiId, reason: FallbackReason) {
        self.fallback_total
            .with_label_values(&[api.as_str(), reason.as_str()])
            .inc();
    }

    /// Update circuit breaker state
    pub fn update_circuit_breaker(&self, api: ApiId, state: CircuitState) {
        self.circuit_breaker_state
            .with_label_values(&[api.as_str()])
            .set(state.as_gauge());
    }

    /// Update today's spend
    pub fn update_budget_spent(&self, api: ApiId, spent: Cost) {
        let value = i64::try_from(spent.minor()).unwrap_or(i64::MAX);
        self.budget_spent.with_label_values(&[api.as_str()]).set(value);
    }

    /// Get metrics as Prometheus text format
    #[must_use]
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Get the Prometheus registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
