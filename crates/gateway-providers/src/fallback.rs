//! Local fallback provider.
//!
//! Answers from canned payloads keyed by API and method, then by API, and
//! otherwise with a generic synthetic payload echoing the request. Every
//! payload it produces is marked `"synthetic": true`.

use gateway_core::{ApiId, ApiRequest, FallbackProvider};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Fallback provider with canned responses
#[derive(Debug, Clone, Default)]
pub struct StaticFallback {
    by_method: HashMap<ApiId, HashMap<String, Value>>,
    by_api: HashMap<ApiId, Value>,
}

impl StaticFallback {
    /// Create a provider that only produces generic synthetic payloads
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` on `api` with `payload`
    #[must_use]
    pub fn with_response(mut self, api: ApiId, method: impl Into<String>, payload: Value) -> Self {
        self.by_method
            .entry(api)
            .or_default()
            .insert(method.into(), mark_synthetic(payload));
        self
    }

    /// Answer any method on `api` without a specific response with `payload`
    #[must_use]
    pub fn with_api_default(mut self, api: ApiId, payload: Value) -> Self {
        self.by_api.insert(api, mark_synthetic(payload));
        self
    }
}

impl FallbackProvider for StaticFallback {
    fn respond(&self, api: ApiId, request: &ApiRequest) -> Value {
        self.by_method
            .get(&api)
            .and_then(|methods| methods.get(request.method()))
            .or_else(|| self.by_api.get(&api))
            .cloned()
            .unwrap_or_else(|| {
                json!({
                    "synthetic": true,
                    "api": api.as_str(),
                    "method": request.method(),
                    "params": request.params(),
                })
            })
    }
}

fn mark_synthetic(payload: Value) -> Value {
    match payload {
        Value::Object(mut fields) => {
            fields.insert("synthetic".to_string(), Value::Bool(true));
            Value::Object(fields)
        }
        other => json!({ "synthetic": true, "data": other }),
    }
}
