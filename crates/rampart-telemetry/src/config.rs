//! Telemetry configuration.

use std::path::PathBuf;

use crate::diagnostics::DiagnosticsConfig;
use crate::metrics::MetricsConfig;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Structured log file. `None` keeps the logger on standard output.
    pub log_file: Option<PathBuf>,

    /// Diagnostic subscriber configuration.
    pub diagnostics: DiagnosticsConfig,

    /// Error metrics cleanup configuration.
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    log_file: Option<PathBuf>,
    diagnostics: Option<DiagnosticsConfig>,
    metrics: Option<MetricsConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends structured logs to an append-only file.
    #[must_use]
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Sets the diagnostics configuration.
    #[must_use]
    pub fn diagnostics(mut self, config: DiagnosticsConfig) -> Self {
        self.diagnostics = Some(config);
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = Some(config);
        self
    }

    /// Sets the diagnostic filter directive.
    #[must_use]
    pub fn diagnostics_level(mut self, level: &str) -> Self {
        let config = self.diagnostics.take().unwrap_or_default();
        self.diagnostics = Some(DiagnosticsConfig {
            level: level.to_string(),
            ..config
        });
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        TelemetryConfig {
            log_file: self.log_file,
            diagnostics: self.diagnostics.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}
