//! Per-attempt timeouts.
//!
//! Every network attempt is bounded by its API's timeout. An attempt that
//! runs out of time becomes a transient [`GatewayError::Timeout`].

use gateway_core::{ApiId, GatewayError};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout applied when an API has none configured
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Attempt timeouts per API
#[derive(Debug, Clone)]
pub struct TimeoutManager {
    default: Duration,
    per_api: HashMap<ApiId, Duration>,
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPT_TIMEOUT)
    }
}

impl TimeoutManager {
    /// Create a timeout manager with a fallback timeout for every API
    #[must_use]
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            per_api: HashMap::new(),
        }
    }

    /// Set the timeout for one API
    #[must_use]
    pub fn with_api_timeout(mut self, api: ApiId, timeout: Duration) -> Self {
        self.per_api.insert(api, timeout);
        self
    }

    /// Timeout in force for an API
    #[must_use]
    pub fn timeout_for(&self, api: ApiId) -> Duration {
        self.per_api.get(&api).copied().unwrap_or(self.default)
    }

    /// Run one attempt under the API's timeout
    ///
    /// # Errors
    /// Returns `GatewayError::Timeout` if the attempt does not finish in time,
    /// otherwise whatever the attempt returned
    pub async fn run<F, T>(&self, api: ApiId, future: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        with_timeout(api, self.timeout_for(api), future).await
    }
}

/// Execute an operation with a timeout
///
/// # Errors
/// Returns `GatewayError::Timeout` if the operation times out
pub async fn with_timeout<F, T>(api: ApiId, timeout: Duration, future: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    if let Ok(result) = tokio::time::timeout(timeout, future).await {
        result
    } else {
        warn!(api = %api, timeout_ms = timeout.as_millis() as u64, "Attempt timed out");
        Err(GatewayError::timeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::ErrorKind;

    #[test]
    fn test_timeout_lookup() {
        let timeouts = TimeoutManager::new(Duration::from_secs(20))
            .with_api_timeout(ApiId::Routing, Duration::from_secs(5));

        assert_eq!(timeouts.timeout_for(ApiId::Routing), Duration::from_secs(5));
        assert_eq!(timeouts.timeout_for(ApiId::Prediction), Duration::from_secs(20));
        assert_eq!(TimeoutManager::default().timeout_for(ApiId::Routing), DEFAULT_ATTEMPT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_fast_attempt_passes_through() {
        let timeouts = TimeoutManager::new(Duration::from_secs(1));
        let result: Result<u32, GatewayError> = timeouts.run(ApiId::Routing, async { Ok(7) }).await;
        assert_eq!(result.expect("ok"), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let timeouts = TimeoutManager::new(Duration::from_millis(50));

        let result: Result<(), GatewayError> = timeouts
            .run(ApiId::Prediction, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.expect_err("timed out");
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_inner_error_is_preserved() {
        let result: Result<(), GatewayError> = with_timeout(
            ApiId::Routing,
            Duration::from_secs(1),
            async { Err(GatewayError::validation("missing origin")) },
        )
        .await;

        assert_eq!(result.expect_err("error").kind(), ErrorKind::Permanent);
    }
}
