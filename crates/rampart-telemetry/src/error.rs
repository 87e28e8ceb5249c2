//! Telemetry error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to install the diagnostic subscriber.
    #[error("Failed to initialize diagnostics: {0}")]
    DiagnosticsInit(String),

    /// Failed to open the log file.
    #[error("Failed to open log file {path}: {source}")]
    LogFile {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::DiagnosticsInit("already set".to_string());
        assert_eq!(err.to_string(), "Failed to initialize diagnostics: already set");
    }

    #[test]
    fn test_log_file_error_display() {
        let err = TelemetryError::LogFile {
            path: PathBuf::from("/nope/app.log"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("Failed to open log file /nope/app.log"));
    }
}
