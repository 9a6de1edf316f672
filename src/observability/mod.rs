//! Observability
//!
//! Operational logging for the enforcers. Application code uses the
//! standard `tracing` macros (and [`security_event!`] for security events)
//! and does not know which format is configured.
//!
//! ```text
//! ┌─────────────────────┐
//! │  Enforcers / Routes │  ← tracing::info!, security_event!
//! └──────────┬──────────┘
//!            │
//! ┌──────────▼──────────┐
//! │  tracing-subscriber │  ← EnvFilter + fmt layer (pretty/json/compact)
//! └─────────────────────┘
//! ```
//!
//! The audit trail is a separate, append-only stream; see [`crate::audit`].
//!
//! # Usage
//!
//! ```ignore
//! use warden::observability::{init, LogFormat, ObservabilityConfig};
//!
//! init(ObservabilityConfig::from_env())?;
//!
//! // Or programmatically
//! init(ObservabilityConfig::builder().log_format(LogFormat::Json).build())?;
//! ```

mod config;
mod events;
mod providers;

pub use config::{LogFormat, ObservabilityConfig, ObservabilityConfigBuilder};
pub use events::{security_event, SecurityEvent, Severity};

use thiserror::Error;
use tracing::info;

/// Install the global subscriber.
///
/// Call once at startup, before any logging occurs.
///
/// # Errors
///
/// Returns an error if the filter directive is invalid or a global
/// subscriber is already installed.
pub fn init(config: ObservabilityConfig) -> Result<(), ObservabilityError> {
    providers::init_tracing(&config)?;

    info!(
        log_format = ?config.log_format,
        log_filter = %config.log_filter,
        "Observability initialized"
    );

    Ok(())
}

/// Observability initialization errors
#[derive(Debug, Error)]
pub enum ObservabilityError {
    /// Invalid configuration
    #[error("Observability config error: {0}")]
    Config(String),
    /// Subscriber installation failed
    #[error("Provider error: {0}")]
    Provider(String),
}
