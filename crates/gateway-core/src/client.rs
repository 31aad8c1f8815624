//! Contracts for the collaborators the gateway protects.
//!
//! The gateway never sees a wire protocol. An [`ApiClient`] either returns an
//! [`ApiReply`] carrying the payload and its reported cost, or a classified
//! [`GatewayError`]. A [`FallbackProvider`] answers locally when the live path
//! is unavailable.

use crate::error::GatewayError;
use crate::types::{ApiId, ApiRequest, Cost};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Successful reply from an external API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiReply {
    /// Response payload
    pub payload: serde_json::Value,
    /// Cost reported for the call
    pub cost: Cost,
}

impl ApiReply {
    /// Create a new reply
    #[must_use]
    pub fn new(payload: serde_json::Value, cost: Cost) -> Self {
        Self { payload, cost }
    }
}

/// Client for one external API
///
/// Implementations perform exactly one network attempt per call; retries,
/// timeouts and accounting belong to the gateway.
#[async_trait]
pub trait ApiClient: Send + Sync + 'static {
    /// API this client talks to
    fn api(&self) -> ApiId;

    /// Perform one call
    ///
    /// # Errors
    /// Returns a classified `GatewayError` when the call fails
    async fn call(&self, request: &ApiRequest) -> Result<ApiReply, GatewayError>;

    /// Whether usable credentials are configured
    fn has_credentials(&self) -> bool {
        true
    }
}

/// Local, synchronous responder used when the live path is bypassed
pub trait FallbackProvider: Send + Sync + 'static {
    /// Produce a synthetic response
    fn respond(&self, api: ApiId, request: &ApiRequest) -> serde_json::Value;
}

impl<F> FallbackProvider for F
where
    F: Fn(ApiId, &ApiRequest) -> serde_json::Value + Send + Sync + 'static,
{
    fn respond(&self, api: ApiId, request: &ApiRequest) -> serde_json::Value {
        self(api, request)
    }
}
