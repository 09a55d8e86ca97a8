//! Structured logging setup.
//!
//! Stage transitions, underwriting verdicts, and sanction decisions all emit
//! `tracing` events; the subscriber installed here is the single
//! observability sink for the orchestrator.

use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{value}'")]
    Filter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync>),
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the configured level
/// applies crate-wide. Session and customer identifiers appear as structured
/// fields, so the compact single-line format stays grep-friendly in
/// aggregated logs.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(&config.log_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

fn env_filter(configured: &str) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(configured).map_err(|source| TelemetryError::Filter {
        value: configured.to_string(),
        source,
    })
}
