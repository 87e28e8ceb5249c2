//! Main configuration types.
//!
//! This module provides the top-level [`RampartConfig`] struct and its builder.

use rampart_telemetry::{DiagnosticsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};

use crate::{
    ConfigError, LogFormat, LoggingConfig, MetricsConfig, RateLimitConfig, RateLimitRule,
    ResponderConfig, WebhookConfig,
};

/// Complete control plane configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use rampart_config::RampartConfig;
///
/// let config = RampartConfig::default();
/// assert_eq!(config.rate_limit.login.limit, 5);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RampartConfig {
    /// Structured log and diagnostic output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Error metrics registry.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Rate limiter presets.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Error responder.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Webhook monitor and health probe.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl RampartConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RampartConfigBuilder {
        RampartConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - A rate limit or window is zero
    /// - The cleanup interval or max age is zero
    /// - The unhealthy threshold is outside 0..=100
    /// - The webhook route does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rules = [
            ("rate_limit.login", self.rate_limit.login),
            ("rate_limit.password_reset", self.rate_limit.password_reset),
            ("rate_limit.webhook", self.rate_limit.webhook),
        ];
        for (name, rule) in rules {
            validate_rule(name, rule)?;
        }

        if self.rate_limit.sweep_every == 0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.sweep_every",
                "must be greater than 0",
            ));
        }

        if self.metrics.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "metrics.cleanup_interval_secs",
                "must be greater than 0",
            ));
        }

        if self.metrics.max_age_secs == 0 {
            return Err(ConfigError::invalid_value(
                "metrics.max_age_secs",
                "must be greater than 0",
            ));
        }

        if !(0.0..=100.0).contains(&self.webhook.unhealthy_below_percent) {
            return Err(ConfigError::invalid_value(
                "webhook.unhealthy_below_percent",
                "must be between 0 and 100",
            ));
        }

        if !self.webhook.route.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "webhook.route",
                format!("must start with '/': {}", self.webhook.route),
            ));
        }

        Ok(())
    }

    /// Development preset: verbose pretty diagnostics, plain-text errors.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart_config::RampartConfig;
    ///
    /// let config = RampartConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.responder.test_mode = true;
        config
    }

    /// Production preset: JSON diagnostics at `warn`, HTML error pages.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "warn".to_string();
        config.logging.format = LogFormat::Json;
        config.responder.test_mode = false;
        config
    }

    /// Derives the telemetry bootstrap configuration.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        let mut builder = TelemetryConfig::builder()
            .diagnostics(DiagnosticsConfig {
                enabled: self.logging.diagnostics,
                level: self.logging.level.clone(),
                json_format: self.logging.format == LogFormat::Json,
                include_target: true,
            })
            .metrics(rampart_telemetry::MetricsConfig {
                cleanup_interval_secs: self.metrics.cleanup_interval_secs,
                max_age_secs: self.metrics.max_age_secs,
            });

        if let Some(path) = &self.logging.file {
            builder = builder.log_file(path.clone());
        }

        builder.build()
    }
}

fn validate_rule(name: &str, rule: RateLimitRule) -> Result<(), ConfigError> {
    if rule.limit == 0 {
        return Err(ConfigError::invalid_value(
            format!("{name}.limit"),
            "must be greater than 0",
        ));
    }
    if rule.window_secs == 0 {
        return Err(ConfigError::invalid_value(
            format!("{name}.window_secs"),
            "must be greater than 0",
        ));
    }
    Ok(())
}

/// Builder for [`RampartConfig`].
#[derive(Debug, Default)]
pub struct RampartConfigBuilder {
    config: RampartConfig,
}

impl RampartConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the metrics section.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.config.metrics = metrics;
        self
    }

    /// Set the rate limit section.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Set the responder section.
    #[must_use]
    pub fn responder(mut self, responder: ResponderConfig) -> Self {
        self.config.responder = responder;
        self
    }

    /// Set the webhook section.
    #[must_use]
    pub fn webhook(mut self, webhook: WebhookConfig) -> Self {
        self.config.webhook = webhook;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RampartConfig {
        self.config
    }
}
