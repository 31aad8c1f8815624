//! Configuration loading from files and environment.
//!
//! This module provides configuration loading from YAML and TOML files,
//! with support for environment variable substitution.

use crate::schema::{ApiConfig, ApisConfig, GatewayConfig};
use gateway_core::ApiId;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Prefix of the environment variables that override loaded values
pub const ENV_PREFIX: &str = "API_GATEWAY";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path to the file that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Unsupported format
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The file extension that was not supported
        extension: String,
    },

    /// Environment override could not be parsed
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvOverride {
        /// Variable name
        name: String,
        /// Offending value
        value: String,
    },
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path
    File(String),
    /// Raw YAML string
    Yaml(String),
    /// Raw TOML string
    Toml(String),
    /// Raw JSON string
    Json(String),
    /// Default configuration
    Default,
}

/// Configuration loader
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            env_prefix: None,
        }
    }

    /// Add a configuration source
    #[must_use]
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    #[must_use]
    pub fn with_file(self, path: impl Into<String>) -> Self {
        self.with_source(ConfigSource::File(path.into()))
    }

    /// Set environment variable prefix for overrides
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load configuration from all sources
    ///
    /// # Errors
    /// Returns error if any source fails to load or validate
    pub async fn load(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = GatewayConfig::default();

        for source in self.sources {
            let source_config = Self::load_source(&source).await?;
            config = Self::merge_configs(config, source_config);
        }

        if let Some(ref prefix) = self.env_prefix {
            config = Self::apply_env_overrides(config, prefix)?;
        }

        config.validate_config()?;

        info!(
            offline = config.mode.offline,
            admin = %config.admin.socket_addr(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    async fn load_source(source: &ConfigSource) -> Result<GatewayConfig, ConfigError> {
        match source {
            ConfigSource::File(path) => Self::load_file(path).await,
            ConfigSource::Yaml(content) => Self::parse_yaml(&Self::substitute_env_vars(content)),
            ConfigSource::Toml(content) => Self::parse_toml(&Self::substitute_env_vars(content)),
            ConfigSource::Json(content) => Self::parse_json(content),
            ConfigSource::Default => Ok(GatewayConfig::default()),
        }
    }

    async fn load_file(path: &str) -> Result<GatewayConfig, ConfigError> {
        let path = Path::new(path);

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let content = Self::substitute_env_vars(&content);

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!(path = %path.display(), format = %extension, "Loading configuration file");

        match extension.as_str() {
            "yaml" | "yml" => Self::parse_yaml(&content),
            "toml" => Self::parse_toml(&content),
            "json" => Self::parse_json(&content),
            ext => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }

    fn parse_yaml(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Substitute environment variables in content
    ///
    /// Supports ${VAR} and ${VAR:-default} syntax. Unset variables without a
    /// default are left in place.
    fn substitute_env_vars(content: &str) -> String {
        let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
            return content.to_string();
        };

        re.replace_all(content, |caps: &regex::Captures<'_>| {
            let var_spec = &caps[1];
            let (var_name, default) = match var_spec.find(":-") {
                Some(idx) => (&var_spec[..idx], Some(&var_spec[idx + 2..])),
                None => (var_spec, None),
            };

            match (std::env::var(var_name), default) {
                (Ok(value), _) => value,
                (Err(_), Some(default_val)) => default_val.to_string(),
                (Err(_), None) => {
                    warn!(variable = var_name, "Environment variable not found");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
    }

    /// Merge two configurations, section by section
    ///
    /// A section of `overlay` replaces the base section unless it still equals
    /// its default.
    fn merge_configs(base: GatewayConfig, overlay: GatewayConfig) -> GatewayConfig {
        fn pick<T: PartialEq + Default>(base: T, overlay: T) -> T {
            if overlay == T::default() {
                base
            } else {
                overlay
            }
        }

        let mut apis = ApisConfig::default();
        let (mut base_apis, mut overlay_apis) = (base.apis, overlay.apis);
        for api in ApiId::ALL {
            let base_api = std::mem::take(base_apis.get_mut(api));
            let overlay_api = std::mem::take(overlay_apis.get_mut(api));
            *apis.get_mut(api) = if overlay_api == ApiConfig::default() {
                base_api
            } else {
                overlay_api
            };
        }

        GatewayConfig {
            apis,
            budget: pick(base.budget, overlay.budget),
            mode: pick(base.mode, overlay.mode),
            admin: pick(base.admin, overlay.admin),
            logging: pick(base.logging, overlay.logging),
            metrics: pick(base.metrics, overlay.metrics),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        mut config: GatewayConfig,
        prefix: &str,
    ) -> Result<GatewayConfig, ConfigError> {
        let offline_var = format!("{prefix}_OFFLINE");
        if let Ok(value) = std::env::var(&offline_var) {
            config.mode.offline = parse_flag(&value).ok_or(ConfigError::InvalidEnvOverride {
                name: offline_var,
                value,
            })?;
        }

        if let Ok(level) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
            config.logging.level = level;
        }

        let port_var = format!("{prefix}_ADMIN_PORT");
        if let Ok(value) = std::env::var(&port_var) {
            config.admin.port = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvOverride {
                    name: port_var,
                    value: value.clone(),
                })?;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Load configuration from default locations
///
/// Looks for configuration in order:
/// 1. Path from CONFIG_PATH environment variable
/// 2. ./gateway.yaml
/// 3. ./config/gateway.yaml
///
/// Environment overrides prefixed with `API_GATEWAY_` are applied either way.
///
/// # Errors
/// Returns error if the configuration fails to parse or validate
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let search_paths = match std::env::var("CONFIG_PATH") {
        Ok(path) => vec![path],
        Err(_) => vec![
            "gateway.yaml".to_string(),
            "gateway.yml".to_string(),
            "config/gateway.yaml".to_string(),
            "config/gateway.yml".to_string(),
        ],
    };

    let loader = ConfigLoader::new().with_env_prefix(ENV_PREFIX);

    for path in &search_paths {
        if Path::new(path).exists() {
            info!(path = %path, "Loading configuration");
            return loader.with_file(path.clone()).load().await;
        }
    }

    warn!("No configuration file found, using defaults");
    loader.with_source(ConfigSource::Default).load().await
}
