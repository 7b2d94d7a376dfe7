//! Subscriber initialization and configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_filter")]
    pub default_filter: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_true")]
    pub with_thread_ids: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: default_filter(),
            format: LogFormat::default(),
            with_thread_ids: true,
        }
    }
}

impl LoggingConfig {
    /// Resolve the filter: `RUST_LOG` wins, then the configured default.
    pub fn env_filter(&self) -> Result<EnvFilter, TracerError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_filter).map_err(|e| TracerError::Filter {
            filter: self.default_filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TracerError> {
    let env_filter = config.env_filter()?;

    match config.format {
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(config.with_thread_ids);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TracerError::Init(e.to_string()))
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(config.with_thread_ids);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .map_err(|e| TracerError::Init(e.to_string()))
        }
    }
}

/// Initialize test logging (safe to call from every test).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,cairn_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}
