//! Webhook monitoring middleware and health report.
//!
//! The monitor wraps webhook routes. After the handler returns it reads the
//! final status and the response body, then updates a shared
//! [`WebhookStatsStore`]. Non-2xx responses count as failures and keep the
//! (capped) body as the last error detail.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{body_bytes, Request, Response};
use chrono::{DateTime, TimeDelta, Utc};
use http::StatusCode;
use http_body_util::Full;
use parking_lot::Mutex;
use rampart_telemetry::{log_fields, Logger};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Default number of body bytes kept for a failed delivery.
pub const DEFAULT_CAPTURE_LIMIT: usize = 4096;

/// Success rate (percent) below which the webhook is unhealthy.
pub const DEFAULT_UNHEALTHY_BELOW: f64 = 80.0;

/// Silence after which an otherwise healthy webhook is degraded.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Counters for webhook deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookStats {
    /// Deliveries seen.
    pub total_requests: u64,
    /// Deliveries answered with a 2xx status.
    pub successful: u64,
    /// Deliveries answered with any other status.
    pub failed: u64,
    /// Start time of the most recent delivery.
    pub last_request_time: Option<DateTime<Utc>>,
    /// Time of the most recent failure.
    pub last_error_time: Option<DateTime<Utc>>,
    /// Body of the most recent failure, possibly truncated.
    pub last_error: String,
}

/// Overall webhook health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Deliveries are arriving and mostly succeeding.
    Healthy,
    /// No failures to speak of, but nothing has arrived recently.
    Degraded,
    /// Too many deliveries are failing.
    Unhealthy,
}

/// Health probe body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookHealth {
    /// Overall status.
    pub status: HealthStatus,
    /// Deliveries seen.
    pub total_requests: u64,
    /// Successful deliveries.
    pub successful: u64,
    /// Failed deliveries.
    pub failed: u64,
    /// `successful / total * 100`, or 0 with no traffic.
    pub success_rate: f64,
    /// Start time of the most recent delivery.
    pub last_request: Option<DateTime<Utc>>,
    /// Time of the most recent failure.
    pub last_error: Option<DateTime<Utc>>,
    /// Body of the most recent failure.
    pub last_error_detail: String,
}

/// Thresholds used to grade webhook health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Success rate (percent) below which the webhook is unhealthy.
    pub unhealthy_below: f64,
    /// Silence after which the webhook is degraded.
    pub stale_after: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            unhealthy_below: DEFAULT_UNHEALTHY_BELOW,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl WebhookStats {
    /// Returns `successful / total * 100`, or 0 with no traffic.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total_requests as f64 * 100.0
    }

    /// Grades these stats as of `now`.
    #[must_use]
    pub fn health_at(&self, now: DateTime<Utc>, thresholds: HealthThresholds) -> WebhookHealth {
        let success_rate = self.success_rate();
        let stale_after = TimeDelta::from_std(thresholds.stale_after).unwrap_or(TimeDelta::MAX);

        let status = if self.total_requests > 0 && success_rate < thresholds.unhealthy_below {
            HealthStatus::Unhealthy
        } else if self
            .last_request_time
            .map_or(true, |last| now.signed_duration_since(last) > stale_after)
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        WebhookHealth {
            status,
            total_requests: self.total_requests,
            successful: self.successful,
            failed: self.failed,
            success_rate,
            last_request: self.last_request_time,
            last_error: self.last_error_time,
            last_error_detail: self.last_error.clone(),
        }
    }
}

/// Shared, mutex-guarded webhook counters.
#[derive(Debug, Default)]
pub struct WebhookStatsStore {
    inner: Mutex<WebhookStats>,
}

impl WebhookStatsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one delivery. Returns `true` if it counted as a failure.
    pub fn record(&self, status: StatusCode, started: DateTime<Utc>, body: &[u8]) -> bool {
        let failed = !status.is_success();
        let mut stats = self.inner.lock();
        stats.total_requests += 1;
        stats.last_request_time = Some(started);
        if failed {
            stats.failed += 1;
            stats.last_error_time = Some(started);
            stats.last_error = String::from_utf8_lossy(body).into_owned();
        } else {
            stats.successful += 1;
        }
        failed
    }

    /// Returns a copy of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> WebhookStats {
        self.inner.lock().clone()
    }

    /// Zeroes the counters and the last error text. Timestamps are kept.
    pub fn reset(&self) {
        let mut stats = self.inner.lock();
        stats.total_requests = 0;
        stats.successful = 0;
        stats.failed = 0;
        stats.last_error.clear();
    }

    /// Grades the current counters as of now.
    #[must_use]
    pub fn health(&self, thresholds: HealthThresholds) -> WebhookHealth {
        self.snapshot().health_at(Utc::now(), thresholds)
    }
}

static GLOBAL_STATS: OnceLock<Arc<WebhookStatsStore>> = OnceLock::new();

/// Returns the process-wide webhook stats store.
pub fn global_stats() -> Arc<WebhookStatsStore> {
    Arc::clone(GLOBAL_STATS.get_or_init(|| Arc::new(WebhookStatsStore::new())))
}

/// Webhook monitoring middleware.
#[derive(Debug, Clone)]
pub struct WebhookMonitorMiddleware {
    stats: Arc<WebhookStatsStore>,
    logger: Arc<Logger>,
    capture_limit: usize,
}

impl WebhookMonitorMiddleware {
    /// Creates a monitor recording into `stats` and logging to `logger`.
    #[must_use]
    pub const fn new(stats: Arc<WebhookStatsStore>, logger: Arc<Logger>) -> Self {
        Self {
            stats,
            logger,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Uses the global stats store and the global logger.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(global_stats(), rampart_telemetry::logger::global())
    }

    /// Sets how many body bytes are kept for a failed delivery.
    #[must_use]
    pub const fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }

    /// Returns the stats store.
    #[must_use]
    pub fn stats(&self) -> &Arc<WebhookStatsStore> {
        &self.stats
    }
}

impl Middleware for WebhookMonitorMiddleware {
    fn name(&self) -> &'static str {
        "webhook-monitor"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started_at = Utc::now();
            let started = Instant::now();
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            let response = next.run(ctx, request).await;
            let status = response.status();
            let (parts, body) = response.into_parts();
            let body = body_bytes(body).await;
            let captured = &body[..body.len().min(self.capture_limit)];

            if self.stats.record(status, started_at, captured) {
                self.logger.error(
                    "Webhook request failed",
                    None,
                    log_fields! {
                        "path" => path,
                        "status" => status.as_u16(),
                        "body" => String::from_utf8_lossy(captured),
                        "trace_id" => ctx.request_id().to_string(),
                    },
                );
            }

            self.logger.info(
                "Webhook request",
                log_fields! {
                    "path" => path,
                    "method" => method.as_str(),
                    "status" => status.as_u16(),
                    "duration_ms" => u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "trace_id" => ctx.request_id().to_string(),
                },
            );

            Response::from_parts(parts, Full::new(body))
        })
    }
}
