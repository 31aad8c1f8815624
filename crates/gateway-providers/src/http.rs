//! JSON-over-HTTP API client.
//!
//! Posts the request parameters as a JSON object to `{endpoint}/{method}`.
//! The upstream reports the cost of a call in the `x-request-cost` header, in
//! minor units; calls without one are charged the configured per-call cost.

use async_trait::async_trait;
use gateway_config::{ApiConfig, GatewayConfig};
use gateway_core::{ApiClient, ApiId, ApiReply, ApiRequest, Cost, GatewayError};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Response header carrying the cost of a call, in minor units
pub const COST_HEADER: &str = "x-request-cost";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// API served by this client
    pub api: ApiId,
    /// Base URL
    pub endpoint: String,
    /// Bearer token
    pub api_key: Option<SecretString>,
    /// Request timeout
    pub timeout: Duration,
    /// Cost charged when the response carries no cost header
    pub default_cost: Cost,
}

impl HttpClientConfig {
    /// Create a configuration with no credentials
    #[must_use]
    pub fn new(api: ApiId, endpoint: impl Into<String>) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            default_cost: Cost::ZERO,
        }
    }

    /// Build from an API's configuration; `None` without an endpoint
    #[must_use]
    pub fn from_api_config(api: ApiId, config: &ApiConfig) -> Option<Self> {
        let endpoint = config.endpoint.clone()?;
        Some(Self {
            api,
            endpoint,
            api_key: config.resolve_api_key(),
            timeout: config.timeout,
            default_cost: config.cost_per_call,
        })
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the cost charged when none is reported
    #[must_use]
    pub fn with_default_cost(mut self, cost: Cost) -> Self {
        self.default_cost = cost;
        self
    }
}

/// [`ApiClient`] over HTTP
pub struct HttpApiClient {
    config: HttpClientConfig,
    client: Client,
}

impl HttpApiClient {
    /// Create a new client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: HttpClientConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), method)
    }

    fn reported_cost(&self, headers: &HeaderMap) -> Cost {
        headers
            .get(COST_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map_or(self.config.default_cost, Cost::from_minor)
    }

    fn transport_error(&self, error: &reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::timeout(self.config.timeout)
        } else if error.is_builder() {
            GatewayError::internal(format!("Failed to build request: {error}"))
        } else if error.is_decode() {
            GatewayError::malformed(format!("Failed to read response body: {error}"))
        } else {
            GatewayError::connection(format!("Request failed: {error}"))
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    fn api(&self) -> ApiId {
        self.config.api
    }

    #[instrument(skip(self, request), fields(api = %self.config.api, method = request.method()))]
    async fn call(&self, request: &ApiRequest) -> Result<ApiReply, GatewayError> {
        let mut builder = self
            .client
            .post(self.method_url(request.method()))
            .json(request.params());
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                api = %self.config.api,
                status = %status,
                error = %body,
                "Upstream returned an error status"
            );
            return Err(classify_status(self.config.api, status, body));
        }

        let cost = self.reported_cost(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let payload: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| GatewayError::malformed(format!("Response is not valid JSON: {e}")))?;

        debug!(api = %self.config.api, cost = %cost, "Upstream call succeeded");
        Ok(ApiReply::new(payload, cost))
    }

    fn has_credentials(&self) -> bool {
        self.config.api_key.is_some()
    }
}

/// Map an error status onto a classified error
///
/// 401 and 403 become authentication errors; everything else keeps its
/// status so it classifies as transient (408, 425, 429, 5xx) or permanent.
#[must_use]
pub fn classify_status(api: ApiId, status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::authentication(format!("{api} rejected the credentials ({status})"))
        }
        _ => GatewayError::upstream(api.as_str(), status.as_u16(), body),
    }
}

/// Build HTTP clients for every API with an endpoint and credentials
///
/// APIs without either are skipped and will be served by the fallback
/// provider.
///
/// # Errors
/// Returns error if an HTTP client cannot be created
pub fn build_clients(config: &GatewayConfig) -> Result<Vec<Arc<dyn ApiClient>>, GatewayError> {
    let mut clients: Vec<Arc<dyn ApiClient>> = Vec::new();

    for api in ApiId::ALL {
        let Some(client_config) = HttpClientConfig::from_api_config(api, config.api(api)) else {
            info!(api = %api, "No endpoint configured, API will use fallback mode");
            continue;
        };
        if client_config.api_key.is_none() {
            warn!(api = %api, "No credentials resolved, API will use fallback mode");
            continue;
        }

        info!(api = %api, endpoint = %client_config.endpoint, "HTTP client configured");
        clients.push(Arc::new(HttpApiClient::new(client_config)?));
    }

    Ok(clients)
}
