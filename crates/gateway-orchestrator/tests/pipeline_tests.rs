//! End-to-end tests of the gateway pipeline with scripted clients.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use gateway_config::{GatewayConfig, RateLimitConfig, RetryConfig};
use gateway_core::{
    ApiClient, ApiId, ApiReply, ApiRequest, BudgetSignal, CallOutcome, Cost, ErrorKind,
    FallbackReason, GatewayError, ManualClock,
};
use gateway_orchestrator::{CallPolicy, Gateway};
use gateway_resilience::CircuitState;
use gateway_telemetry::Metrics;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct ScriptedClient {
    api: ApiId,
    script: Mutex<VecDeque<Result<ApiReply, GatewayError>>>,
    cost: Cost,
    latency: Duration,
    credentials: bool,
    calls: AtomicU32,
}

impl ScriptedClient {
    fn new(api: ApiId) -> Self {
        Self {
            api,
            script: Mutex::new(VecDeque::new()),
            cost: Cost::from_minor(100),
            latency: Duration::ZERO,
            credentials: true,
            calls: AtomicU32::new(0),
        }
    }

    fn costing(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    /// Queue a failure; once the script runs out every call succeeds
    fn then_fail(self, error: GatewayError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiClient for ScriptedClient {
    fn api(&self) -> ApiId {
        self.api
    }

    async fn call(&self, request: &ApiRequest) -> Result<ApiReply, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(ApiReply::new(
                json!({ "api": self.api.as_str(), "method": request.method(), "call": call }),
                self.cost,
            )),
        }
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }
}

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Defaults with fast, jitter-free retries
fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for api in ApiId::ALL {
        config.apis.get_mut(api).retry = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: 0.0,
        };
    }
    config
}

fn request(id: u32) -> ApiRequest {
    ApiRequest::new("optimize").unwrap().param("route", id)
}

fn synthetic(api: ApiId, request: &ApiRequest) -> serde_json::Value {
    json!({ "synthetic": true, "api": api.as_str(), "method": request.method() })
}

#[tokio::test]
async fn test_budget_scenario_warning_then_exceeded() {
    let mut config = config();
    config.apis.routing.budget.warning = Cost::from_minor(500);
    config.apis.routing.budget.critical = Cost::from_minor(1000);

    let clock = ManualClock::shared(start());
    let client = Arc::new(ScriptedClient::new(ApiId::Routing).costing(Cost::from_minor(400)));
    let gateway = Gateway::builder(config)
        .clock(clock.clone())
        .shared_client(client.clone())
        .build()
        .unwrap();

    let policy = CallPolicy::new().with_cost_estimate(Cost::from_minor(400));

    let first = gateway.invoke(ApiId::Routing, &request(1), policy).await;
    assert!(matches!(
        first,
        CallOutcome::Success { cost, budget: BudgetSignal::Ok, attempts: 1, .. } if cost == Cost::from_minor(400)
    ));

    clock.advance(Duration::from_secs(1));
    let second = gateway.invoke(ApiId::Routing, &request(2), policy).await;
    assert!(matches!(
        second,
        CallOutcome::Success { budget: BudgetSignal::WarningCrossed, .. }
    ));

    clock.advance(Duration::from_secs(1));
    let third = gateway.invoke(ApiId::Routing, &request(3), policy).await;
    assert_eq!(
        third,
        CallOutcome::BudgetExceeded {
            spent: Cost::from_minor(800),
            critical: Cost::from_minor(1000),
        }
    );
    assert_eq!(client.calls(), 2);

    let budget = gateway.api_status(ApiId::Routing).budget;
    assert_eq!(budget.spent, Cost::from_minor(800));
    assert_eq!(budget.reserved, Cost::ZERO);
}

#[tokio::test]
async fn test_budget_resets_at_day_boundary() {
    let mut config = config();
    config.apis.routing.budget.warning = Cost::from_minor(100);
    config.apis.routing.budget.critical = Cost::from_minor(100);

    let clock = ManualClock::shared(start());
    let gateway = Gateway::builder(config)
        .clock(clock.clone())
        .client(ScriptedClient::new(ApiId::Routing).costing(Cost::from_minor(100)))
        .build()
        .unwrap();

    let policy = CallPolicy::new().uncached();
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(2), policy).await,
        CallOutcome::BudgetExceeded { .. }
    ));

    clock.set(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap());
    assert!(gateway.invoke(ApiId::Routing, &request(3), policy).await.is_success());
}

#[tokio::test]
async fn test_rate_limit_one_per_second() {
    let mut config = config();
    config.apis.routing.rate_limit = RateLimitConfig {
        per_second: Some(1),
        per_minute: None,
        per_day: None,
    };

    let clock = ManualClock::shared(start());
    let client = Arc::new(ScriptedClient::new(ApiId::Routing));
    let gateway = Gateway::builder(config)
        .clock(clock.clone())
        .shared_client(client.clone())
        .build()
        .unwrap();

    let first = gateway.invoke(ApiId::Routing, &request(1), CallPolicy::new()).await;
    assert!(first.is_success());

    let second = gateway.invoke(ApiId::Routing, &request(2), CallPolicy::new()).await;
    let retry_after = second.retry_after().expect("throttled");
    assert!(matches!(second, CallOutcome::Throttled { .. }));
    assert!(retry_after <= Duration::from_secs(1));
    assert!(!retry_after.is_zero());
    assert_eq!(client.calls(), 1);

    clock.advance(retry_after);
    let third = gateway.invoke(ApiId::Routing, &request(2), CallPolicy::new()).await;
    assert!(third.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_burst_respects_limit() {
    let mut config = config();
    config.apis.prediction.rate_limit = RateLimitConfig {
        per_second: Some(5),
        per_minute: None,
        per_day: None,
    };

    let client = Arc::new(ScriptedClient::new(ApiId::Prediction));
    let gateway = Arc::new(
        Gateway::builder(config)
            .clock(ManualClock::shared(start()))
            .shared_client(client.clone())
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..50)
        .map(|id| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let request = ApiRequest::new("forecast").unwrap().param("sku", id);
                gateway
                    .invoke(ApiId::Prediction, &request, CallPolicy::new())
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut throttled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CallOutcome::Success { .. } => successes += 1,
            CallOutcome::Throttled { .. } => throttled += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(throttled, 45);
    assert_eq!(client.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_reservations_cannot_overshoot() {
    let mut config = config();
    config.apis.routing.budget.warning = Cost::from_minor(1000);
    config.apis.routing.budget.critical = Cost::from_minor(1000);

    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing)
            .costing(Cost::from_minor(400))
            .with_latency(Duration::from_millis(50)),
    );
    let gateway = Arc::new(
        Gateway::builder(config)
            .clock(ManualClock::shared(start()))
            .shared_client(client.clone())
            .build()
            .unwrap(),
    );

    let policy = CallPolicy::new().with_cost_estimate(Cost::from_minor(400));
    let handles: Vec<_> = (0..5)
        .map(|id| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move { gateway.invoke(ApiId::Routing, &request(id), policy).await })
        })
        .collect();

    let mut successes = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            CallOutcome::Success { .. } => successes += 1,
            CallOutcome::BudgetExceeded { .. } => denied += 1,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(successes, 2);
    assert_eq!(denied, 3);
    assert_eq!(client.calls(), 2);
    assert_eq!(
        gateway.api_status(ApiId::Routing).budget.spent,
        Cost::from_minor(800)
    );
}

#[tokio::test]
async fn test_cache_hit_skips_quota_and_budget() {
    let clock = ManualClock::shared(start());
    let client = Arc::new(ScriptedClient::new(ApiId::Routing));
    let gateway = Gateway::builder(config())
        .clock(clock.clone())
        .shared_client(client.clone())
        .build()
        .unwrap();

    let policy = CallPolicy::new().with_cache_ttl(Duration::from_secs(60));
    let live = gateway.invoke(ApiId::Routing, &request(7), policy).await;
    let payload = live.payload().cloned().expect("payload");

    clock.advance(Duration::from_secs(30));
    let cached = gateway.invoke(ApiId::Routing, &request(7), policy).await;
    assert_eq!(cached, CallOutcome::CacheHit { payload });
    assert_eq!(client.calls(), 1);

    let status = gateway.api_status(ApiId::Routing);
    assert_eq!(status.budget.spent, Cost::from_minor(100));
    assert_eq!(status.cache.hits, 1);
    let second_window = &status.rate_windows[0];
    assert_eq!(second_window.count, 0);

    clock.advance(Duration::from_secs(31));
    let expired = gateway.invoke(ApiId::Routing, &request(7), policy).await;
    assert!(expired.is_success());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_cache_is_namespaced_per_api() {
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .client(ScriptedClient::new(ApiId::Routing))
        .client(ScriptedClient::new(ApiId::Prediction))
        .build()
        .unwrap();

    let request = request(1);
    assert!(gateway.invoke(ApiId::Routing, &request, CallPolicy::new()).await.is_success());
    assert!(gateway.invoke(ApiId::Prediction, &request, CallPolicy::new()).await.is_success());
    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request, CallPolicy::new()).await,
        CallOutcome::CacheHit { .. }
    ));
}

#[tokio::test]
async fn test_uncached_policy_skips_write() {
    let client = Arc::new(ScriptedClient::new(ApiId::Routing));
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let policy = CallPolicy::new().uncached();
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    let client = Arc::new(
        ScriptedClient::new(ApiId::Prediction)
            .then_fail(GatewayError::upstream("prediction", 503, "unavailable"))
            .then_fail(GatewayError::connection("connection reset")),
    );
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(ApiId::Prediction, &request(1), CallPolicy::new())
        .await;

    assert!(matches!(outcome, CallOutcome::Success { attempts: 3, .. }));
    assert_eq!(client.calls(), 3);
    // Charged once, not per attempt
    assert_eq!(
        gateway.api_status(ApiId::Prediction).budget.spent,
        Cost::from_minor(100)
    );
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing).then_fail(GatewayError::validation("unknown depot")),
    );
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(
            ApiId::Routing,
            &request(1),
            CallPolicy::new().with_cost_estimate(Cost::from_minor(300)),
        )
        .await;

    assert!(matches!(
        outcome,
        CallOutcome::Failed { kind: ErrorKind::Permanent, attempts: 1, .. }
    ));
    assert_eq!(client.calls(), 1);

    let status = gateway.api_status(ApiId::Routing);
    assert_eq!(status.budget.spent, Cost::ZERO);
    assert_eq!(status.budget.reserved, Cost::ZERO);
    assert_eq!(status.breaker.state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted() {
    let mut config = config();
    config.apis.routing.retry.max_attempts = 3;
    config.apis.routing.circuit_breaker.failure_threshold = 10;

    let client = Arc::new(
        (0..3).fold(ScriptedClient::new(ApiId::Routing), |client, _| {
            client.then_fail(GatewayError::timeout(Duration::from_secs(30)))
        }),
    );
    let gateway = Gateway::builder(config)
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(ApiId::Routing, &request(1), CallPolicy::new())
        .await;
    assert!(matches!(
        outcome,
        CallOutcome::Failed { kind: ErrorKind::Transient, attempts: 3, .. }
    ));
    assert_eq!(client.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_mid_retry() {
    let mut config = config();
    config.apis.routing.circuit_breaker.failure_threshold = 2;

    let client = Arc::new(
        (0..5).fold(ScriptedClient::new(ApiId::Routing), |client, _| {
            client.then_fail(GatewayError::upstream("routing", 502, "bad gateway"))
        }),
    );
    let gateway = Gateway::builder(config)
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(ApiId::Routing, &request(1), CallPolicy::new())
        .await;
    assert_eq!(outcome, CallOutcome::CircuitOpen { attempts: 2 });
    assert_eq!(client.calls(), 2);

    let outcome = gateway
        .invoke(ApiId::Routing, &request(2), CallPolicy::new())
        .await;
    assert_eq!(outcome, CallOutcome::CircuitOpen { attempts: 0 });
    assert_eq!(client.calls(), 2);
    assert_eq!(
        gateway.api_status(ApiId::Routing).breaker.state,
        CircuitState::Open
    );
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_recovers() {
    let mut config = config();
    config.apis.routing.retry.max_attempts = 1;
    config.apis.routing.circuit_breaker.failure_threshold = 1;
    config.apis.routing.circuit_breaker.success_threshold = 1;
    config.apis.routing.circuit_breaker.recovery_timeout = Duration::from_secs(60);

    let clock = ManualClock::shared(start());
    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing).then_fail(GatewayError::connection("refused")),
    );
    let gateway = Gateway::builder(config)
        .clock(clock.clone())
        .shared_client(client.clone())
        .build()
        .unwrap();

    let policy = CallPolicy::new().uncached();
    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::Failed { kind: ErrorKind::Transient, .. }
    ));

    clock.advance(Duration::from_secs(30));
    assert_eq!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::CircuitOpen { attempts: 0 }
    );

    clock.advance(Duration::from_secs(30));
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert_eq!(
        gateway.api_status(ApiId::Routing).breaker.state,
        CircuitState::Closed
    );
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_offline_routes_to_fallback() {
    let mut config = config();
    config.mode.offline = true;

    let client = Arc::new(ScriptedClient::new(ApiId::Prediction));
    let gateway = Gateway::builder(config)
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .fallback(synthetic)
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(
            ApiId::Prediction,
            &request(1),
            CallPolicy::new().with_cost_estimate(Cost::from_minor(100)),
        )
        .await;

    match outcome {
        CallOutcome::Fallback { payload, reason } => {
            assert_eq!(reason, FallbackReason::Offline);
            assert_eq!(payload["synthetic"], true);
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(client.calls(), 0);

    let status = gateway.api_status(ApiId::Prediction);
    assert_eq!(status.budget.spent, Cost::ZERO);
    assert_eq!(status.rate_windows[0].count, 0);

    gateway.set_offline_override(Some(false));
    assert!(gateway
        .invoke(ApiId::Prediction, &request(1), CallPolicy::new())
        .await
        .is_success());
}

#[tokio::test]
async fn test_missing_credentials_route_to_fallback() {
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .client(ScriptedClient::new(ApiId::Routing).without_credentials())
        .fallback(synthetic)
        .build()
        .unwrap();

    for api in ApiId::ALL {
        let outcome = gateway.invoke(api, &request(1), CallPolicy::new()).await;
        assert!(matches!(
            outcome,
            CallOutcome::Fallback { reason: FallbackReason::NoCredentials, .. }
        ));
    }
}

#[tokio::test]
async fn test_no_fallback_provider() {
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .build()
        .unwrap();

    let outcome = gateway
        .invoke(ApiId::Routing, &request(1), CallPolicy::new())
        .await;
    assert!(matches!(
        outcome,
        CallOutcome::Failed { kind: ErrorKind::Permanent, attempts: 0, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_breaker_ceiling_routes_to_fallback() {
    let mut config = config();
    config.mode.fallback_after = Duration::from_secs(30);
    config.apis.routing.retry.max_attempts = 1;
    config.apis.routing.circuit_breaker.failure_threshold = 1;
    config.apis.routing.circuit_breaker.success_threshold = 1;
    config.apis.routing.circuit_breaker.recovery_timeout = Duration::from_secs(60);

    let clock = ManualClock::shared(start());
    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing).then_fail(GatewayError::upstream("routing", 500, "boom")),
    );
    let gateway = Gateway::builder(config)
        .clock(clock.clone())
        .shared_client(client.clone())
        .fallback(synthetic)
        .build()
        .unwrap();

    let policy = CallPolicy::new().uncached();
    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::Failed { .. }
    ));

    clock.advance(Duration::from_secs(10));
    assert_eq!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::CircuitOpen { attempts: 0 }
    );

    clock.advance(Duration::from_secs(35));
    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::Fallback { reason: FallbackReason::BreakerCeiling, .. }
    ));

    // Recovery timeout reached: the probe goes live and closes the breaker
    clock.advance(Duration::from_secs(15));
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_in_flight_call() {
    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing).with_latency(Duration::from_secs(10)),
    );
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = gateway
        .invoke_with_cancel(
            ApiId::Routing,
            &request(1),
            CallPolicy::new().with_cost_estimate(Cost::from_minor(500)),
            &cancel,
        )
        .await;

    assert_eq!(outcome, CallOutcome::Cancelled { attempts: 1 });
    let status = gateway.api_status(ApiId::Routing);
    assert_eq!(status.budget.spent, Cost::ZERO);
    assert_eq!(status.budget.reserved, Cost::ZERO);
    assert_eq!(status.cache.entries, 0);
}

#[tokio::test]
async fn test_already_cancelled() {
    let client = Arc::new(ScriptedClient::new(ApiId::Routing));
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = gateway
        .invoke_with_cancel(ApiId::Routing, &request(1), CallPolicy::new(), &cancel)
        .await;
    assert_eq!(outcome, CallOutcome::Cancelled { attempts: 0 });
    assert_eq!(client.calls(), 0);
}

/// Cancels the caller's token from inside the call, then answers anyway
struct CancelsThenAnswers {
    token: CancellationToken,
}

#[async_trait]
impl ApiClient for CancelsThenAnswers {
    fn api(&self) -> ApiId {
        ApiId::Routing
    }

    async fn call(&self, _request: &ApiRequest) -> Result<ApiReply, GatewayError> {
        self.token.cancel();
        Ok(ApiReply::new(json!({ "route": [1, 2] }), Cost::from_minor(70)))
    }
}

#[tokio::test]
async fn test_response_ready_at_cancellation_is_charged() {
    let cancel = CancellationToken::new();
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .client(CancelsThenAnswers {
            token: cancel.clone(),
        })
        .build()
        .unwrap();

    let outcome = gateway
        .invoke_with_cancel(ApiId::Routing, &request(1), CallPolicy::new(), &cancel)
        .await;

    assert!(cancel.is_cancelled());
    match outcome {
        CallOutcome::Success { cost, attempts, .. } => {
            assert_eq!(cost, Cost::from_minor(70));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected success, got {other:?}"),
    }

    let status = gateway.api_status(ApiId::Routing);
    assert_eq!(status.budget.spent, Cost::from_minor(70));
    assert_eq!(status.budget.reserved, Cost::ZERO);
    assert_eq!(status.cache.entries, 1);

    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(1), CallPolicy::new()).await,
        CallOutcome::CacheHit { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_admin_reset_breaker_and_override() {
    let mut config = config();
    config.apis.routing.retry.max_attempts = 1;
    config.apis.routing.circuit_breaker.failure_threshold = 1;
    config.apis.routing.budget.warning = Cost::from_minor(100);
    config.apis.routing.budget.critical = Cost::from_minor(100);

    let client = Arc::new(
        ScriptedClient::new(ApiId::Routing).then_fail(GatewayError::connection("reset")),
    );
    let gateway = Gateway::builder(config)
        .clock(ManualClock::shared(start()))
        .shared_client(client.clone())
        .build()
        .unwrap();

    let policy = CallPolicy::new().uncached();
    assert!(!gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());
    assert_eq!(
        gateway.invoke(ApiId::Routing, &request(1), policy).await,
        CallOutcome::CircuitOpen { attempts: 0 }
    );

    let breaker = gateway.reset_breaker(ApiId::Routing);
    assert_eq!(breaker.state, CircuitState::Closed);
    assert!(gateway.invoke(ApiId::Routing, &request(1), policy).await.is_success());

    assert!(matches!(
        gateway.invoke(ApiId::Routing, &request(2), policy).await,
        CallOutcome::BudgetExceeded { .. }
    ));

    assert!(gateway.override_budget(ApiId::Routing).overridden);
    assert!(gateway.invoke(ApiId::Routing, &request(2), policy).await.is_success());
}

#[tokio::test]
async fn test_admin_thresholds_rate_limits_and_cache() {
    let mut config = config();
    config.apis.prediction.rate_limit = RateLimitConfig {
        per_second: Some(1),
        per_minute: None,
        per_day: None,
    };
    config.apis.prediction.budget.warning = Cost::from_minor(100);
    config.apis.prediction.budget.critical = Cost::from_minor(100);

    let gateway = Gateway::builder(config)
        .clock(ManualClock::shared(start()))
        .client(ScriptedClient::new(ApiId::Prediction))
        .build()
        .unwrap();

    assert!(gateway
        .invoke(ApiId::Prediction, &request(1), CallPolicy::new())
        .await
        .is_success());
    assert!(matches!(
        gateway.invoke(ApiId::Prediction, &request(2), CallPolicy::new()).await,
        CallOutcome::Throttled { .. }
    ));

    let windows = gateway.reset_rate_limits(ApiId::Prediction);
    assert!(windows.iter().all(|window| window.count == 0));
    assert!(matches!(
        gateway.invoke(ApiId::Prediction, &request(2), CallPolicy::new()).await,
        CallOutcome::BudgetExceeded { .. }
    ));

    gateway
        .set_budget_thresholds(ApiId::Prediction, Cost::from_minor(150), Cost::from_minor(300))
        .unwrap();
    gateway.reset_rate_limits(ApiId::Prediction);
    assert!(matches!(
        gateway.invoke(ApiId::Prediction, &request(2), CallPolicy::new()).await,
        CallOutcome::Success { budget: BudgetSignal::WarningCrossed, .. }
    ));

    assert_eq!(gateway.invalidate_cache(ApiId::Prediction), 2);
    assert_eq!(gateway.api_status(ApiId::Prediction).cache.entries, 0);
}

#[tokio::test]
async fn test_metrics_recorded() {
    let metrics = Arc::new(Metrics::new(&Default::default()).unwrap());
    let gateway = Gateway::builder(config())
        .clock(ManualClock::shared(start()))
        .client(ScriptedClient::new(ApiId::Routing))
        .fallback(synthetic)
        .metrics(metrics.clone())
        .build()
        .unwrap();

    gateway.invoke(ApiId::Routing, &request(1), CallPolicy::new()).await;
    gateway.invoke(ApiId::Routing, &request(1), CallPolicy::new()).await;
    gateway.invoke(ApiId::Prediction, &request(1), CallPolicy::new()).await;

    let output = metrics.gather();
    assert!(output.contains("api_gateway_calls_total{api=\"routing\",outcome=\"success\"} 1"));
    assert!(output.contains("api_gateway_calls_total{api=\"routing\",outcome=\"cache_hit\"} 1"));
    assert!(output.contains("api_gateway_fallback_total{api=\"prediction\",reason=\"no_credentials\"} 1"));
    assert!(output.contains("api_gateway_budget_spent_minor{api=\"routing\"} 100"));
}
