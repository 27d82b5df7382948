//! Structured logging and tracing configuration.
//!
//! Log output is plain text or JSON, filtered by `RUST_LOG` when set and by
//! the configured level otherwise.

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

use crate::{Error, Result};

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "DBXIGNORE_LOG_LEVEL";

/// Environment variable enabling JSON log output.
pub const LOG_JSON_ENV: &str = "DBXIGNORE_LOG_JSON";

/// Tracing configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = if config.json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };
    installed.map_err(|e| Error::config(format!("cannot install tracing subscriber: {e}")))?;

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
    Ok(())
}

/// Read tracing configuration from the environment.
///
/// Respects `DBXIGNORE_LOG_LEVEL` (default "info") and `DBXIGNORE_LOG_JSON`
/// (default false).
#[must_use]
pub fn config_from_env() -> TracingConfig {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
    let json = std::env::var(LOG_JSON_ENV)
        .map(|v| parse_flag(&v))
        .unwrap_or(false);

    TracingConfig { level, json }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Spans wrapping the daemon's units of work.
pub mod spans {
    use std::path::Path;

    use tracing::{info_span, Span};

    /// Span for one full walk of the tree.
    #[must_use]
    pub fn scan_span(root: &Path) -> Span {
        info_span!("scan", root = %root.display())
    }

    /// Span for one batch of settled watch events.
    #[must_use]
    pub fn dispatch_span(events: usize) -> Span {
        info_span!("dispatch", events)
    }
}
