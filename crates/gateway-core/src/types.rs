//! Validated domain types for outbound API calls.
//!
//! Every per-API piece of gateway state (limits, breaker, budget, cache
//! namespace) is keyed by [`ApiId`]. Requests are normalized into an
//! [`ApiRequest`] whose [`Fingerprint`] is stable for equal method + parameters.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, AddAssign};
use thiserror::Error;

/// Validation error for domain types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Unknown API identifier
    #[error("Unknown API identifier: {value}")]
    UnknownApi {
        /// The value that failed to parse
        value: String,
    },

    /// Request method validation failed
    #[error("Invalid request method: {reason}")]
    InvalidMethod {
        /// Reason for validation failure
        reason: String,
    },
}

/// External API targeted by a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiId {
    /// Routing / route-optimization API
    Routing,
    /// Demand prediction API
    Prediction,
}

impl ApiId {
    /// All known APIs, in a stable order
    pub const ALL: [ApiId; 2] = [ApiId::Routing, ApiId::Prediction];

    /// Lowercase label used in logs, metrics and admin paths
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Prediction => "prediction",
        }
    }
}

impl fmt::Display for ApiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApiId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "routing" | "route" => Ok(Self::Routing),
            "prediction" | "predict" | "forecast" => Ok(Self::Prediction),
            _ => Err(ValidationError::UnknownApi {
                value: s.to_string(),
            }),
        }
    }
}

/// Monetary amount in minor units (e.g. cents)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cost(u64);

impl Cost {
    /// Zero cost
    pub const ZERO: Cost = Cost(0);

    /// Create a cost from minor units
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Amount in minor units
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Cost) -> Cost {
        Cost(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction
    #[must_use]
    pub const fn saturating_sub(self, other: Cost) -> Cost {
        Cost(self.0.saturating_sub(other.0))
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        *self = self.saturating_add(rhs);
    }
}

impl From<u64> for Cost {
    fn from(minor: u64) -> Self {
        Self(minor)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Deterministic cache key derived from a normalized request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Hash a canonical request text
    #[must_use]
    pub fn of_canonical(canonical: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Raw fingerprint value
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// An outbound request, normalized as method + sorted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    method: String,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
}

impl ApiRequest {
    /// Create a request for a method with no parameters
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidMethod` if the method is blank or
    /// contains whitespace
    pub fn new(method: impl Into<String>) -> Result<Self, ValidationError> {
        let method = method.into();
        let trimmed = method.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidMethod {
                reason: "cannot be empty".to_string(),
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidMethod {
                reason: format!("'{trimmed}' contains whitespace"),
            });
        }
        Ok(Self {
            method: trimmed.to_string(),
            params: BTreeMap::new(),
        })
    }

    /// Add a parameter (replacing any previous value for the key)
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request parameters, sorted by key
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.params
    }

    /// Canonical text form: `"method"?"k1"=v1&"k2"=v2` with the method and
    /// keys JSON-quoted, keys sorted, and values rendered as compact JSON
    /// (object keys sorted as well). Quoting keeps distinct requests distinct
    /// whatever characters their method or keys contain.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        write_json_string(&mut out, &self.method);
        for (i, (key, value)) in self.params.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            write_json_string(&mut out, key);
            out.push('=');
            write_canonical_value(&mut out, value);
        }
        out
    }

    /// Fingerprint of the canonical form
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_canonical(&self.canonical())
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push_str(&serde_json::Value::String(s.to_string()).to_string());
}

fn write_canonical_value(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(out, k);
                out.push(':');
                write_canonical_value(out, v);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_value(out, v);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_id_parse_and_display() {
        assert_eq!("routing".parse::<ApiId>(), Ok(ApiId::Routing));
        assert_eq!("Prediction".parse::<ApiId>(), Ok(ApiId::Prediction));
        assert_eq!("forecast".parse::<ApiId>(), Ok(ApiId::Prediction));
        assert!("billing".parse::<ApiId>().is_err());
        assert_eq!(ApiId::Routing.to_string(), "routing");
    }

    #[test]
    fn test_api_id_serde() {
        let api: ApiId = serde_json::from_str("\"prediction\"").expect("deserialize");
        assert_eq!(api, ApiId::Prediction);
        assert_eq!(serde_json::to_string(&ApiId::Routing).expect("serialize"), "\"routing\"");
    }

    #[test]
    fn test_cost_arithmetic_and_display() {
        let mut total = Cost::from_minor(400);
        total += Cost::from_minor(450);
        assert_eq!(total.minor(), 850);
        assert_eq!(total.to_string(), "8.50");
        assert_eq!(Cost::from_minor(5).to_string(), "0.05");
        assert_eq!(Cost::from_minor(u64::MAX) + Cost::from_minor(1), Cost::from_minor(u64::MAX));
        assert_eq!(Cost::from_minor(3).saturating_sub(Cost::from_minor(5)), Cost::ZERO);
    }

    #[test]
    fn test_request_validation() {
        assert!(ApiRequest::new("").is_err());
        assert!(ApiRequest::new("   ").is_err());
        assert!(ApiRequest::new("plan route").is_err());
        assert_eq!(ApiRequest::new("  optimize ").expect("valid").method(), "optimize");
    }

    #[test]
    fn test_fingerprint_ignores_parameter_order() {
        let a = ApiRequest::new("optimize")
            .expect("valid")
            .param("origin", "A")
            .param("destination", "B");
        let b = ApiRequest::new("optimize")
            .expect("valid")
            .param("destination", "B")
            .param("origin", "A");

        assert_eq!(
            a.canonical(),
            r#""optimize"?"destination"="B"&"origin"="A""#
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_normalizes_nested_objects() {
        let a = ApiRequest::new("forecast")
            .expect("valid")
            .param("filter", json!({"region": "north", "sku": 7}));
        let b = ApiRequest::new("forecast")
            .expect("valid")
            .param("filter", json!({"sku": 7, "region": "north"}));

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_method_and_values() {
        let base = ApiRequest::new("optimize").expect("valid").param("stops", 3);
        let other_value = ApiRequest::new("optimize").expect("valid").param("stops", 4);
        let other_method = ApiRequest::new("estimate").expect("valid").param("stops", 3);

        assert_ne!(base.fingerprint(), other_value.fingerprint());
        assert_ne!(base.fingerprint(), other_method.fingerprint());
    }

    #[test]
    fn test_canonical_keeps_separators_in_keys_distinct() {
        let two_params = ApiRequest::new("route")
            .expect("valid")
            .param("a", 1)
            .param("b", 2);
        let one_param = ApiRequest::new("route").expect("valid").param("a=1&b", 2);

        assert_ne!(two_params.canonical(), one_param.canonical());
        assert_ne!(two_params.fingerprint(), one_param.fingerprint());
    }

    #[test]
    fn test_canonical_keeps_separators_in_method_distinct() {
        let query_in_method = ApiRequest::new("route?a=1").expect("valid");
        let with_param = ApiRequest::new("route").expect("valid").param("a", 1);

        assert_ne!(query_in_method.canonical(), with_param.canonical());
        assert_ne!(query_in_method.fingerprint(), with_param.fingerprint());
    }

    #[test]
    fn test_canonical_escapes_quotes() {
        let quoted = ApiRequest::new("route").expect("valid").param("a\"=\"b", 1);
        assert_eq!(quoted.canonical(), r#""route"?"a\"=\"b"=1"#);
    }
}
