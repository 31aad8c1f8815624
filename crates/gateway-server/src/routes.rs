//! Route table for the admin API.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, middleware as mw, state::AppState};

/// Build the admin router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/admin/status", get(handlers::gateway_status))
        .route("/admin/breakers/:api/reset", post(handlers::reset_breaker))
        .route(
            "/admin/budgets/:api/thresholds",
            put(handlers::set_budget_thresholds),
        )
        .route("/admin/budgets/:api/override", post(handlers::override_budget))
        .route("/admin/mode", put(handlers::set_mode))
        .route(
            "/admin/rate-limits/:api/reset",
            post(handlers::reset_rate_limits),
        )
        .route("/admin/cache/:api", delete(handlers::invalidate_cache))
        .layer(middleware::from_fn(mw::response_time_middleware))
        .layer(middleware::from_fn(mw::logging_middleware))
        .with_state(state)
}
