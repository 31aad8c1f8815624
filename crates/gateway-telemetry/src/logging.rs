//! Structured logging configuration.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and one of
//! three output formats (JSON, pretty or compact). `RUST_LOG` takes
//! precedence over the configured level unless explicit filter directives are
//! configured.

use gateway_config::{LogFormat, LoggingConfig};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Failed to parse filter
    #[error("Failed to parse log filter: {0}")]
    FilterParse(String),
}

/// Map a level name onto a tracing [`Level`], defaulting to INFO
#[must_use]
pub fn tracing_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with the given configuration
///
/// # Errors
/// Returns error if the filter is invalid or a global subscriber is already
/// installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let level = tracing_level(&config.level).to_string().to_lowercase();

    if let Some(ref directives) = config.filter {
        return EnvFilter::try_new(format!("{level},{directives}"))
            .map_err(|e| LoggingError::FilterParse(e.to_string()));
    }

    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
}
