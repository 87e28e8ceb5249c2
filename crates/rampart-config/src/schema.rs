//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Output format of the diagnostic subscriber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable lines.
    Pretty,
}

/// Logging configuration section.
///
/// `file` redirects the structured application log; `level` and `format`
/// apply to the diagnostic output on standard error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Append structured log lines to this file instead of standard output.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Diagnostic filter directive (e.g., "warn", "`rampart_middleware=debug`").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Diagnostic output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Install the diagnostic subscriber.
    #[serde(default = "default_true")]
    pub diagnostics: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: default_log_level(),
            format: LogFormat::default(),
            diagnostics: true,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Error metrics configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Seconds between background cleanup sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Entries idle for longer than this are reset by cleanup.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: default_cleanup_interval(),
            max_age_secs: default_max_age(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    60 * 60
}

fn default_max_age() -> u64 {
    7 * 24 * 60 * 60
}

/// A single `(limit, window)` pair.
///
/// # Example
///
/// ```
/// use rampart_config::RateLimitRule;
/// use std::time::Duration;
///
/// let rule = RateLimitRule { limit: 5, window_secs: 60 };
/// assert_eq!(rule.window(), Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitRule {
    /// Requests admitted per window.
    pub limit: usize,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl RateLimitRule {
    /// Returns the window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiter configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Login endpoint limit.
    #[serde(default = "default_login_rule")]
    pub login: RateLimitRule,

    /// Password reset endpoint limit.
    #[serde(default = "default_password_reset_rule")]
    pub password_reset: RateLimitRule,

    /// Webhook endpoint limit.
    #[serde(default = "default_webhook_rule")]
    pub webhook: RateLimitRule,

    /// Drop idle keys every this many admissions.
    #[serde(default = "default_sweep_every")]
    pub sweep_every: u64,

    /// Emit `x-ratelimit-*` and `retry-after` headers.
    #[serde(default = "default_true")]
    pub headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login: default_login_rule(),
            password_reset: default_password_reset_rule(),
            webhook: default_webhook_rule(),
            sweep_every: default_sweep_every(),
            headers: true,
        }
    }
}

fn default_login_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 5,
        window_secs: 60,
    }
}

fn default_password_reset_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 3,
        window_secs: 60 * 60,
    }
}

fn default_webhook_rule() -> RateLimitRule {
    RateLimitRule {
        limit: 10,
        window_secs: 60,
    }
}

fn default_sweep_every() -> u64 {
    1024
}

/// Error responder configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    /// Skip HTML rendering and always answer with plain text.
    #[serde(default)]
    pub test_mode: bool,

    /// Template used for HTML error pages.
    #[serde(default = "default_error_template")]
    pub error_template: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            test_mode: false,
            error_template: default_error_template(),
        }
    }
}

fn default_error_template() -> String {
    "partials/error.templ".to_string()
}

/// Webhook monitor configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Route pattern treated as the webhook endpoint.
    #[serde(default = "default_webhook_route")]
    pub route: String,

    /// Bytes of each response body kept for `last_error_detail`.
    #[serde(default = "default_capture_limit")]
    pub capture_limit: usize,

    /// Success rate (percent) below which the endpoint is unhealthy.
    #[serde(default = "default_unhealthy_below")]
    pub unhealthy_below_percent: f64,

    /// Seconds without traffic after which the endpoint is degraded.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            route: default_webhook_route(),
            capture_limit: default_capture_limit(),
            unhealthy_below_percent: default_unhealthy_below(),
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_webhook_route() -> String {
    "/webhook".to_string()
}

fn default_capture_limit() -> usize {
    4096
}

fn default_unhealthy_below() -> f64 {
    80.0
}

fn default_stale_after() -> u64 {
    24 * 60 * 60
}

fn default_true() -> bool {
    true
}
