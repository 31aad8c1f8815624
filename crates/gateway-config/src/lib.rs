//! # Gateway Configuration
//!
//! Configuration management for the API resilience gateway, including:
//! - Per-API limits, breaker, retry, budget and cache settings
//! - Loading from YAML/TOML files with environment variable substitution
//! - `API_GATEWAY_*` environment overrides

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod schema;

// Re-export main types
pub use loader::{load_config, ConfigError, ConfigLoader, ConfigSource, ENV_PREFIX};
pub use schema::{
    AdminConfig, ApiConfig, ApisConfig, BudgetConfig, CacheConfig, CircuitBreakerConfig,
    GatewayConfig, LedgerConfig, LogFormat, LoggingConfig, MetricsConfig, ModeConfig,
    RateLimitConfig, RetryConfig,
};
