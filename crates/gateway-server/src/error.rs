//! API error handling.
//!
//! Every admin error is rendered as `{"error": {"message", "type"}}` with a
//! matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gateway_orchestrator::AdminError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details
    pub error: ApiErrorDetail,
}

/// Error detail
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    /// Error message
    pub message: String,
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
}

/// API error wrapper
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code
    pub status: StatusCode,
    /// Error type
    pub error_type: String,
    /// Error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request_error", message)
    }

    /// Not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found_error", message)
    }

    /// Unprocessable request error
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_request_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(
            status = %self.status,
            message = %self.message,
            "Admin API error response"
        );

        let body = ApiErrorResponse {
            error: ApiErrorDetail {
                message: self.message,
                error_type: self.error_type,
            },
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::Budget(e) => Self::unprocessable(e.to_string()),
        }
    }
}
