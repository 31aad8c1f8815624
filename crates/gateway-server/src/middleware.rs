//! HTTP middleware for the admin API.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = info_span!("admin_request", method = %method, uri = %uri);
    let start = Instant::now();

    let response = next.run(request).instrument(span).await;

    info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Admin request completed"
    );

    response
}

/// Adds an `x-response-time` header
pub async fn response_time_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let duration_ms = format!("{}ms", start.elapsed().as_millis());
    if let Ok(value) = HeaderValue::from_str(&duration_ms) {
        response.headers_mut().insert("x-response-time", value);
    }

    response
}
