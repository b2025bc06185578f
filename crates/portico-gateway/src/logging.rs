//! Structured logging setup.
//!
//! ```rust,ignore
//! use portico_gateway::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! tracing::info!(route = "webhook", "request completed");
//! ```

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{GatewayError, GatewayResult};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `portico_gateway=debug,hyper=warn`.
    pub level: String,

    /// JSON lines instead of human-readable output.
    pub json_format: bool,

    /// Emit span open/close events.
    pub span_events: bool,

    /// Include the module path of each event.
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            include_target: true,
        }
    }
}

impl From<&LoggingSettings> for LogConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            json_format: settings.json,
            ..Self::default()
        }
    }
}

/// Build the event filter for a level directive.
pub fn create_env_filter(level: &str) -> GatewayResult<EnvFilter> {
    EnvFilter::try_new(level).map_err(|e| GatewayError::config(format!("invalid log level: {e}")))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails on an invalid level directive or when a global subscriber is
/// already set.
pub fn init_logging(config: &LogConfig) -> GatewayResult<()> {
    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_target(config.include_target)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| GatewayError::server(format!("failed to initialise logging: {e}")))
}
