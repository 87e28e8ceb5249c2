//! Diagnostic output for the control plane itself.
//!
//! The structured [`Logger`](crate::Logger) is the application log. Failures
//! of the logger (unserializable entries, broken sinks) and internal events of
//! the control plane (cleanup sweeps, rate-limit rejections) go to the
//! `tracing` facade instead, which this module wires to standard error.
//!
//! # Example
//!
//! ```rust,ignore
//! use rampart_telemetry::diagnostics::{init_diagnostics, DiagnosticsConfig};
//!
//! init_diagnostics(&DiagnosticsConfig::default())?;
//! tracing::debug!(cleared = 3, "Error metrics cleanup");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Diagnostic subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Whether a subscriber is installed at all.
    pub enabled: bool,

    /// Filter directive (e.g., "warn", "rampart_middleware=debug").
    pub level: String,

    /// Whether to output JSON instead of human-readable lines.
    pub json_format: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "warn".to_string(),
            json_format: true,
            include_target: true,
        }
    }
}

impl DiagnosticsConfig {
    /// Human-readable, verbose output for local development.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            include_target: true,
        }
    }
}

/// Installs the global diagnostic subscriber writing to standard error.
///
/// # Errors
///
/// Returns [`TelemetryError::DiagnosticsInit`] if the filter is invalid or a
/// global subscriber is already installed.
pub fn init_diagnostics(config: &DiagnosticsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::DiagnosticsInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::DiagnosticsInit(e.to_string()))?;
    }

    Ok(())
}

/// Parses a filter directive.
///
/// # Errors
///
/// Returns an error if the directive is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::DiagnosticsInit(format!("Invalid log level: {e}")))
}
