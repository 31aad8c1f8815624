//! HTTP request handlers for the admin API.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{ApiId, Cost};
use gateway_orchestrator::GatewayStatus;
use gateway_resilience::{BreakerSnapshot, BudgetSnapshot, WindowOccupancy};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{error::ApiError, state::AppState};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Whether calls are being forced to the fallback provider
    pub offline: bool,
}

/// Budget threshold update
#[derive(Debug, Deserialize)]
pub struct ThresholdsRequest {
    /// Warning threshold, minor units
    pub warning: Cost,
    /// Critical threshold, minor units
    pub critical: Cost,
}

/// Offline mode update; `null` clears the override
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    /// Forced offline state
    pub offline: Option<bool>,
}

/// Current offline mode
#[derive(Debug, Serialize)]
pub struct ModeResponse {
    /// Effective offline flag
    pub offline: bool,
    /// Operator override, if any
    pub offline_override: Option<bool>,
}

/// Result of a cache invalidation
#[derive(Debug, Serialize)]
pub struct CacheInvalidated {
    /// API whose namespace was cleared
    pub api: ApiId,
    /// Entries removed
    pub removed: usize,
}

fn parse_api(raw: &str) -> Result<ApiId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Unknown API: {raw}")))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
        offline: state.gateway.is_offline(),
    })
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.gateway.metrics() {
        Some(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.gather(),
        )
            .into_response(),
        None => ApiError::not_found("Metrics are disabled").into_response(),
    }
}

/// Full gateway status
pub async fn gateway_status(State(state): State<AppState>) -> Json<GatewayStatus> {
    Json(state.gateway.status())
}

/// Force an API's circuit breaker to Closed
#[instrument(skip(state))]
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    let api = parse_api(&api)?;
    info!(api = %api, "Operator reset circuit breaker");
    Ok(Json(state.gateway.reset_breaker(api)))
}

/// Replace an API's budget thresholds
#[instrument(skip(state, body))]
pub async fn set_budget_thresholds(
    State(state): State<AppState>,
    Path(api): Path<String>,
    Json(body): Json<ThresholdsRequest>,
) -> Result<Json<BudgetSnapshot>, ApiError> {
    let api = parse_api(&api)?;
    let snapshot = state
        .gateway
        .set_budget_thresholds(api, body.warning, body.critical)?;
    info!(
        api = %api,
        warning = %body.warning,
        critical = %body.critical,
        "Operator changed budget thresholds"
    );
    Ok(Json(snapshot))
}

/// Lift an API's critical budget denial for the rest of the day
#[instrument(skip(state))]
pub async fn override_budget(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Result<Json<BudgetSnapshot>, ApiError> {
    let api = parse_api(&api)?;
    info!(api = %api, "Operator overrode budget");
    Ok(Json(state.gateway.override_budget(api)))
}

/// Force offline mode on or off, or clear the override
#[instrument(skip(state, body))]
pub async fn set_mode(
    State(state): State<AppState>,
    Json(body): Json<ModeRequest>,
) -> Json<ModeResponse> {
    state.gateway.set_offline_override(body.offline);
    Json(ModeResponse {
        offline: state.gateway.is_offline(),
        offline_override: state.gateway.offline_override(),
    })
}

/// Clear an API's rate-limit windows
#[instrument(skip(state))]
pub async fn reset_rate_limits(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Result<Json<Vec<WindowOccupancy>>, ApiError> {
    let api = parse_api(&api)?;
    Ok(Json(state.gateway.reset_rate_limits(api)))
}

/// Drop an API's cached responses
#[instrument(skip(state))]
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Path(api): Path<String>,
) -> Result<(StatusCode, Json<CacheInvalidated>), ApiError> {
    let api = parse_api(&api)?;
    let removed = state.gateway.invalidate_cache(api);
    Ok((StatusCode::OK, Json(CacheInvalidated { api, removed })))
}
