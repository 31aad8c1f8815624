//! Live/fallback mode selection.
//!
//! Mode is re-evaluated on every call. Offline (configured or set by an
//! operator) wins, then a missing client or missing credentials, then a
//! breaker that has stayed away from Closed past the ceiling and is not ready
//! to admit a probe.

use chrono::{DateTime, Utc};
use gateway_config::ModeConfig;
use gateway_core::{ApiClient, FallbackReason};
use gateway_resilience::CircuitBreaker;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// How a call will be served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "reason", rename_all = "snake_case")]
pub enum Mode {
    /// Through the live pipeline
    Live,
    /// By the fallback provider
    Fallback(FallbackReason),
}

impl Mode {
    /// Check if calls go through the live pipeline
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Why the live path is bypassed, if it is
    #[must_use]
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Self::Live => None,
            Self::Fallback(reason) => Some(*reason),
        }
    }
}

/// Decides the mode for each call
#[derive(Debug)]
pub struct ModeSelector {
    configured_offline: bool,
    offline_override: RwLock<Option<bool>>,
    fallback_after: Duration,
}

impl ModeSelector {
    /// Create a selector from configuration
    #[must_use]
    pub fn new(config: &ModeConfig) -> Self {
        Self {
            configured_offline: config.offline,
            offline_override: RwLock::new(None),
            fallback_after: config.fallback_after,
        }
    }

    /// Whether calls are currently forced offline
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline_override
            .read()
            .unwrap_or(self.configured_offline)
    }

    /// Operator override, if set
    #[must_use]
    pub fn offline_override(&self) -> Option<bool> {
        *self.offline_override.read()
    }

    /// Set or clear the operator override. `None` returns to the configured
    /// setting.
    pub fn set_offline_override(&self, value: Option<bool>) {
        *self.offline_override.write() = value;
        info!(
            offline_override = ?value,
            offline = self.is_offline(),
            "Offline override changed"
        );
    }

    /// Breaker ceiling after which calls are routed to the fallback provider
    #[must_use]
    pub fn fallback_after(&self) -> Duration {
        self.fallback_after
    }

    /// Mode for one call
    #[must_use]
    pub fn select(
        &self,
        client: Option<&dyn ApiClient>,
        breaker: &CircuitBreaker,
        now: DateTime<Utc>,
    ) -> Mode {
        if self.is_offline() {
            return Mode::Fallback(FallbackReason::Offline);
        }

        if !client.is_some_and(|client| client.has_credentials()) {
            return Mode::Fallback(FallbackReason::NoCredentials);
        }

        let past_ceiling = breaker
            .unhealthy_for(now)
            .is_some_and(|unhealthy| unhealthy >= self.fallback_after);
        if past_ceiling && !breaker.would_admit(now) {
            return Mode::Fallback(FallbackReason::BreakerCeiling);
        }

        Mode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use gateway_config::CircuitBreakerConfig;
    use gateway_core::{ApiId, ApiReply, ApiRequest, Cost, GatewayError};
    use std::sync::Arc;

    struct StubClient {
        credentials: bool,
    }

    #[async_trait]
    impl ApiClient for StubClient {
        fn api(&self) -> ApiId {
            ApiId::Routing
        }

        async fn call(&self, _request: &ApiRequest) -> Result<ApiReply, GatewayError> {
            Ok(ApiReply::new(serde_json::Value::Null, Cost::ZERO))
        }

        fn has_credentials(&self) -> bool {
            self.credentials
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            ApiId::Routing,
            CircuitBreakerConfig {
                failure_threshold: 1,
                success_threshold: 1,
                recovery_timeout: Duration::from_secs(60),
            },
        ))
    }

    fn selector(offline: bool) -> ModeSelector {
        ModeSelector::new(&ModeConfig {
            offline,
            fallback_after: Duration::from_secs(30),
        })
    }

    #[test]
    fn test_live_by_default() {
        let client = StubClient { credentials: true };
        let mode = selector(false).select(Some(&client), &breaker(), at(0));
        assert_eq!(mode, Mode::Live);
        assert!(mode.is_live());
    }

    #[test]
    fn test_offline_wins() {
        let client = StubClient { credentials: false };
        let mode = selector(true).select(Some(&client), &breaker(), at(0));
        assert_eq!(mode.fallback_reason(), Some(FallbackReason::Offline));
    }

    #[test]
    fn test_missing_credentials() {
        let selector = selector(false);
        let client = StubClient { credentials: false };

        assert_eq!(
            selector.select(Some(&client), &breaker(), at(0)),
            Mode::Fallback(FallbackReason::NoCredentials)
        );
        assert_eq!(
            selector.select(None, &breaker(), at(0)),
            Mode::Fallback(FallbackReason::NoCredentials)
        );
    }

    #[test]
    fn test_override_replaces_configured_flag() {
        let selector = selector(true);
        assert!(selector.is_offline());

        selector.set_offline_override(Some(false));
        assert!(!selector.is_offline());
        assert_eq!(selector.offline_override(), Some(false));

        selector.set_offline_override(None);
        assert!(selector.is_offline());
    }

    #[test]
    fn test_breaker_ceiling() {
        let selector = selector(false);
        let client = StubClient { credentials: true };
        let breaker = breaker();

        breaker.try_acquire(at(0)).unwrap().fail(at(0));

        // Open but not yet past the ceiling: the call goes live and the
        // breaker rejects it.
        assert_eq!(selector.select(Some(&client), &breaker, at(10)), Mode::Live);

        assert_eq!(
            selector.select(Some(&client), &breaker, at(45)),
            Mode::Fallback(FallbackReason::BreakerCeiling)
        );

        // Recovery timeout elapsed: a probe may go out even past the ceiling.
        assert_eq!(selector.select(Some(&client), &breaker, at(60)), Mode::Live);
    }
}
