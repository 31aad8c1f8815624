//! Configuration schema definitions.
//!
//! This module defines all configuration types with validation and defaults.
//! Per-API settings are a fixed struct with one named field per [`ApiId`].

use gateway_core::{ApiId, Cost};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::loader::ConfigError;

/// Main gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// Per-API configuration
    #[validate(nested)]
    pub apis: ApisConfig,

    /// Ledger-wide budget settings
    #[validate(nested)]
    pub budget: LedgerConfig,

    /// Live/fallback mode settings
    pub mode: ModeConfig,

    /// Admin HTTP surface
    #[validate(nested)]
    pub admin: AdminConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

impl GatewayConfig {
    /// Validate the configuration, including cross-field rules the derive
    /// cannot express
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` describing the first problem found
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        for api in ApiId::ALL {
            let cfg = self.apis.get(api);
            if cfg.budget.warning > cfg.budget.critical {
                return Err(ConfigError::Validation(format!(
                    "apis.{api}.budget: warning ({}) exceeds critical ({})",
                    cfg.budget.warning, cfg.budget.critical
                )));
            }
            if cfg.retry.base_delay > cfg.retry.max_delay {
                return Err(ConfigError::Validation(format!(
                    "apis.{api}.retry: base_delay {:?} exceeds max_delay {:?}",
                    cfg.retry.base_delay, cfg.retry.max_delay
                )));
            }
            if cfg.timeout.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "apis.{api}.timeout must be greater than zero"
                )));
            }
            if cfg.circuit_breaker.recovery_timeout.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "apis.{api}.circuit_breaker.recovery_timeout must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Configuration for one API
    #[must_use]
    pub fn api(&self, api: ApiId) -> &ApiConfig {
        self.apis.get(api)
    }
}

/// One configuration block per API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ApisConfig {
    /// Routing API
    #[validate(nested)]
    pub routing: ApiConfig,

    /// Prediction API
    #[validate(nested)]
    pub prediction: ApiConfig,
}

impl ApisConfig {
    /// Configuration for one API
    #[must_use]
    pub fn get(&self, api: ApiId) -> &ApiConfig {
        match api {
            ApiId::Routing => &self.routing,
            ApiId::Prediction => &self.prediction,
        }
    }

    /// Mutable configuration for one API
    pub fn get_mut(&mut self, api: ApiId) -> &mut ApiConfig {
        match api {
            ApiId::Routing => &mut self.routing,
            ApiId::Prediction => &mut self.prediction,
        }
    }
}

/// Configuration for a single external API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the API (no live client is built without one)
    #[validate(url)]
    pub endpoint: Option<String>,

    /// API key, literal or `${ENV_VAR}` reference
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Timeout for a single attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Cost charged when the API does not report one
    pub cost_per_call: Cost,

    /// Rate limits
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker thresholds
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry and backoff
    #[validate(nested)]
    pub retry: RetryConfig,

    /// Daily budget thresholds
    pub budget: BudgetConfig,

    /// Response cache
    #[validate(nested)]
    pub cache: CacheConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: None,
            timeout: Duration::from_secs(30),
            cost_per_call: Cost::ZERO,
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Resolve the API key from config or environment
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        let raw = if let Some(ref key) = self.api_key {
            if key.starts_with("${") && key.ends_with('}') {
                let env_var = &key[2..key.len() - 1];
                std::env::var(env_var).ok()
            } else {
                Some(key.clone())
            }
        } else if let Some(ref env_var) = self.api_key_env {
            std::env::var(env_var).ok()
        } else {
            None
        };

        raw.filter(|k| !k.trim().is_empty()).map(SecretString::from)
    }
}

/// Fixed-window rate limits; an unset granularity is unlimited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls per second
    #[validate(range(min = 1))]
    pub per_second: Option<u32>,

    /// Calls per minute
    #[validate(range(min = 1))]
    pub per_minute: Option<u32>,

    /// Calls per day
    #[validate(range(min = 1))]
    pub per_day: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: Some(10),
            per_minute: Some(300),
            per_day: Some(50_000),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    #[validate(range(min = 1, max = 100))]
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit
    #[validate(range(min = 1, max = 100))]
    pub success_threshold: u32,

    /// Time to wait before letting a probe through
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,

    /// Delay before the second attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Backoff multiplier
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,

    /// Jitter factor (0.0 - 1.0)
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

/// Daily budget thresholds for one API, in minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Non-blocking warning threshold
    pub warning: Cost,

    /// Hard stop threshold
    pub critical: Cost,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            warning: Cost::from_minor(50_000),
            critical: Cost::from_minor(100_000),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether responses for this API are cached
    pub enabled: bool,

    /// TTL used when the caller does not choose one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Maximum entries in this API's namespace
    #[validate(range(min = 1))]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// Ledger-wide budget settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LedgerConfig {
    /// Offset from UTC, in minutes, of the timezone whose midnight rolls the
    /// ledger over
    #[validate(range(min = -1439, max = 1439))]
    pub utc_offset_minutes: i32,

    /// Optional cap on the combined daily spend of all APIs
    pub global_critical: Option<Cost>,
}

/// Live/fallback mode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Route every call to the fallback provider
    pub offline: bool,

    /// How long a breaker may stay away from Closed before calls are routed
    /// to the fallback provider
    #[serde(with = "humantime_serde")]
    pub fallback_after: Duration,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            offline: false,
            fallback_after: Duration::from_secs(600),
        }
    }
}

/// Admin HTTP surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AdminConfig {
    /// Whether the admin server is started
    pub enabled: bool,

    /// Bind host
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 9400,
        }
    }
}

impl AdminConfig {
    /// Get the socket address
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,

    /// Log format
    pub format: LogFormat,

    /// Additional filter directives (e.g. "reqwest=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            filter: None,
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs
    #[default]
    Json,
    /// Human-readable pretty logs
    Pretty,
    /// Compact single-line logs
    Compact,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are exposed
    pub enabled: bool,

    /// Histogram buckets for call latency, in seconds
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_buckets: vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
        }
    }
}
