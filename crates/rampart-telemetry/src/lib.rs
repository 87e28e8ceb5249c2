//! Structured logging and error metrics for rampart.
//!
//! This crate provides the two observability sinks the control plane writes
//! to:
//!
//! - **Logger**: one JSON object per line on standard output or an
//!   append-only file, with `user_id`, `path` and `trace_id` hoisted to
//!   top-level keys
//! - **Error metrics**: an in-memory registry of errors keyed by kind, status
//!   and endpoint, with latency percentiles and time-windowed rates
//!
//! Failures inside the logger itself are reported through `tracing`, which
//! [`init_diagnostics`] wires to standard error.
//!
//! # Example
//!
//! ```rust,ignore
//! use rampart_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .log_file("/var/log/shop.log")
//!         .build();
//!
//!     let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//!
//!     rampart_telemetry::logger::info("Server started", rampart_telemetry::log_fields! {
//!         "port" => 8080,
//!     });
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logger;
pub mod metrics;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use diagnostics::{init_diagnostics, DiagnosticsConfig};
pub use error::TelemetryError;
pub use logger::{LogEntry, LogFields, LogLevel, LogSink, Logger, MemoryWriter};
pub use metrics::{
    ErrorEntry, ErrorMetrics, ErrorStats, LatencyPercentiles, MetricsConfig, RecentError,
};

#[doc(hidden)]
pub use serde_json as __serde_json;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Guard that restores the global logger to standard output on drop.
///
/// Keep it alive for the lifetime of the application so the log file stays
/// open.
#[derive(Debug)]
pub struct TelemetryGuard {
    file_logging: bool,
}

impl TelemetryGuard {
    /// Creates a guard. `file_logging` controls whether drop resets the logger.
    #[must_use]
    pub const fn new(file_logging: bool) -> Self {
        Self { file_logging }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.file_logging {
            logger::reset_logging();
        }
    }
}

/// Initializes all telemetry subsystems.
///
/// Installs the diagnostic subscriber, points the global logger at the
/// configured file (if any), registers metric descriptions and, when called
/// inside a Tokio runtime, starts the global registry's cleanup task with the
/// configured interval.
///
/// # Errors
///
/// Returns `TelemetryError` if the diagnostic subscriber cannot be installed
/// or the log file cannot be opened.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_diagnostics(&config.diagnostics)?;

    if let Some(path) = &config.log_file {
        logger::setup_file_logging(path)?;
    }

    metrics::describe_metrics();
    if !metrics::start_global_cleanup(&config.metrics) {
        tracing::debug!("Error metrics cleanup not started by init_telemetry");
    }

    Ok(TelemetryGuard::new(config.log_file.is_some()))
}
