//! Operator view and controls.
//!
//! Read-only snapshots of every API's breaker, rate windows, budget and
//! cache, plus the runtime actions an operator may take: force-reset a
//! breaker, change or override a budget, force offline mode, reset rate
//! windows and drop cached responses.

use crate::mode::Mode;
use crate::orchestrator::Gateway;
use chrono::{DateTime, Utc};
use gateway_config::BudgetConfig;
use gateway_core::{ApiId, Cost};
use gateway_resilience::{
    BreakerSnapshot, BudgetError, BudgetSnapshot, CacheStats, GlobalBudgetSnapshot,
    WindowOccupancy,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Operator action errors
#[derive(Debug, Error)]
pub enum AdminError {
    /// Budget change rejected
    #[error(transparent)]
    Budget(#[from] BudgetError),
}

/// Snapshot of one API
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatus {
    /// API
    pub api: ApiId,
    /// Mode a call made now would run in
    pub mode: Mode,
    /// Whether a live client is registered
    pub live_client: bool,
    /// Circuit breaker
    pub breaker: BreakerSnapshot,
    /// Rate-limit windows
    pub rate_windows: Vec<WindowOccupancy>,
    /// Today's budget
    pub budget: BudgetSnapshot,
    /// Response cache namespace
    pub cache: CacheStats,
}

/// Snapshot of the whole gateway
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    /// When the snapshot was taken
    pub generated_at: DateTime<Utc>,
    /// Whether calls are currently forced offline
    pub offline: bool,
    /// Operator override of the offline flag, if any
    pub offline_override: Option<bool>,
    /// Combined budget
    pub global_budget: GlobalBudgetSnapshot,
    /// Per-API state
    pub apis: Vec<ApiStatus>,
}

impl Gateway {
    /// Snapshot every API
    #[must_use]
    pub fn status(&self) -> GatewayStatus {
        let now = self.clock.now();
        GatewayStatus {
            generated_at: now,
            offline: self.mode.is_offline(),
            offline_override: self.mode.offline_override(),
            global_budget: self.ledger.global_snapshot(now),
            apis: ApiId::ALL
                .into_iter()
                .map(|api| self.api_status_at(api, now))
                .collect(),
        }
    }

    /// Snapshot one API
    #[must_use]
    pub fn api_status(&self, api: ApiId) -> ApiStatus {
        self.api_status_at(api, self.clock.now())
    }

    fn api_status_at(&self, api: ApiId, now: DateTime<Utc>) -> ApiStatus {
        let breaker = self.breakers.get_or_create(api);
        let client = self.clients.get(&api);
        ApiStatus {
            api,
            mode: self.mode.select(client.map(|client| &**client), &breaker, now),
            live_client: client.is_some(),
            breaker: breaker.snapshot(),
            rate_windows: self.limiter.occupancy(api, now),
            budget: self.ledger.snapshot(api, now),
            cache: self.cache.stats(api),
        }
    }

    /// Force an API's breaker back to Closed
    pub fn reset_breaker(&self, api: ApiId) -> BreakerSnapshot {
        self.breakers.reset(api);
        if let Some(metrics) = &self.metrics {
            metrics.update_circuit_breaker(api, self.breakers.get_or_create(api).state());
        }
        self.breakers.snapshot(api)
    }

    /// Replace an API's budget thresholds at runtime
    ///
    /// # Errors
    /// Returns error if `warning` exceeds `critical`
    pub fn set_budget_thresholds(
        &self,
        api: ApiId,
        warning: Cost,
        critical: Cost,
    ) -> Result<BudgetSnapshot, AdminError> {
        let now = self.clock.now();
        self.ledger
            .set_thresholds(api, BudgetConfig { warning, critical }, now)?;
        Ok(self.ledger.snapshot(api, now))
    }

    /// Lift an API's critical denial until the next day boundary
    pub fn override_budget(&self, api: ApiId) -> BudgetSnapshot {
        let now = self.clock.now();
        self.ledger.override_budget(api, now);
        self.ledger.snapshot(api, now)
    }

    /// Force offline mode on or off, or clear the override with `None`
    pub fn set_offline_override(&self, offline: Option<bool>) {
        self.mode.set_offline_override(offline);
    }

    /// Whether calls are currently forced to the fallback provider
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.mode.is_offline()
    }

    /// Operator override of the offline flag, if any
    #[must_use]
    pub fn offline_override(&self) -> Option<bool> {
        self.mode.offline_override()
    }

    /// Clear an API's rate-limit windows
    pub fn reset_rate_limits(&self, api: ApiId) -> Vec<WindowOccupancy> {
        self.limiter.reset(api);
        info!(api = %api, "Rate-limit windows reset");
        self.limiter.occupancy(api, self.clock.now())
    }

    /// Drop every cached response for an API, returning how many were removed
    pub fn invalidate_cache(&self, api: ApiId) -> usize {
        let removed = self.cache.invalidate_api(api);
        info!(api = %api, removed, "Cache namespace invalidated");
        removed
    }

    /// Drop expired cache entries across every API
    pub fn purge_expired_cache(&self) -> usize {
        self.cache.purge_expired(self.clock.now())
    }
}
