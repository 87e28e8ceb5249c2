//! Terminal handlers supplied by the control plane.
//!
//! - [`no_route_handler`] - 404 through the responder, so negotiation applies
//! - [`no_method_handler`] - JSON 405
//! - [`error_metrics_handler`] - admin dashboard data from the metrics registry
//! - [`webhook_health_handler`] - webhook health probe

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Handler};
use crate::responder::Responder;
use crate::stages::webhook::{HealthThresholds, WebhookStatsStore};
use crate::types::{Request, RequestParts, Response, ResponseExt};
use http::StatusCode;
use rampart_core::{AppError, ErrorResponse};
use rampart_telemetry::{ErrorMetrics, ErrorStats, LatencyPercentiles, RecentError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Message used for unmatched routes.
pub const PAGE_NOT_FOUND: &str = "Page not found";

/// Message used for unsupported methods.
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";

/// Number of recent error kinds shown on the dashboard.
pub const DASHBOARD_RECENT_ERRORS: usize = 10;

/// Handler for requests no route matched.
#[must_use]
pub fn no_route_handler(responder: Arc<Responder>) -> Handler {
    Arc::new(
        move |ctx: &mut MiddlewareContext, request: Request| -> BoxFuture<'static, Response> {
            let parts = RequestParts::from_request(&request);
            let response = responder.respond(ctx, &parts, &AppError::not_found(PAGE_NOT_FOUND));
            ctx.mark_aborted();
            Box::pin(async move { response })
        },
    )
}

/// Handler for requests whose route exists but not for this method.
#[must_use]
pub fn no_method_handler() -> Handler {
    Arc::new(
        |ctx: &mut MiddlewareContext, _request: Request| -> BoxFuture<'static, Response> {
            ctx.mark_aborted();
            let body = ErrorResponse::new(StatusCode::METHOD_NOT_ALLOWED.as_u16(), METHOD_NOT_ALLOWED);
            let response = Response::json(StatusCode::METHOD_NOT_ALLOWED, &body);
            Box::pin(async move { response })
        },
    )
}

/// Dashboard time ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    /// Last hour.
    #[serde(rename = "1h")]
    Hour,
    /// Last six hours.
    #[serde(rename = "6h")]
    SixHours,
    /// Last day.
    #[default]
    #[serde(rename = "24h")]
    Day,
    /// Last week.
    #[serde(rename = "7d")]
    Week,
    /// Last thirty days.
    #[serde(rename = "30d")]
    Month,
}

impl TimeRange {
    /// Parses a `range` query value, defaulting to 24 hours.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("1h") => Self::Hour,
            Some("6h") => Self::SixHours,
            Some("7d") => Self::Week,
            Some("30d") => Self::Month,
            _ => Self::Day,
        }
    }

    /// Returns the query form, e.g. `24h`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::SixHours => "6h",
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
        }
    }

    /// Returns the window length.
    #[must_use]
    pub const fn duration(self) -> Duration {
        const HOUR: u64 = 60 * 60;
        Duration::from_secs(match self {
            Self::Hour => HOUR,
            Self::SixHours => 6 * HOUR,
            Self::Day => 24 * HOUR,
            Self::Week => 7 * 24 * HOUR,
            Self::Month => 30 * 24 * HOUR,
        })
    }
}

/// Admin dashboard payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetricsReport {
    /// Per-kind counts within the selected range.
    pub error_rates: HashMap<String, u64>,
    /// Latency percentiles across every kind.
    pub latency_percentiles: LatencyPercentiles,
    /// Most recently seen kinds, newest first.
    pub recent_errors: Vec<RecentError>,
    /// Full snapshot of all three views.
    pub stats: ErrorStats,
    /// The selected range.
    pub time_range: TimeRange,
}

impl ErrorMetricsReport {
    /// Collects a report from `metrics` for `range`.
    #[must_use]
    pub fn collect(metrics: &ErrorMetrics, range: TimeRange) -> Self {
        Self {
            error_rates: metrics.error_rates(range.duration()),
            latency_percentiles: metrics.latency_percentiles(),
            recent_errors: metrics.recent_errors(DASHBOARD_RECENT_ERRORS),
            stats: metrics.stats(),
            time_range: range,
        }
    }
}

/// Query string accepted by the dashboard handler.
#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    range: Option<String>,
}

impl DashboardQuery {
    fn from_request(request: &Request) -> Self {
        let query = request.uri().query().unwrap_or_default();
        serde_urlencoded::from_str(query).unwrap_or_default()
    }
}

/// Handler returning the admin dashboard data as JSON.
#[must_use]
pub fn error_metrics_handler(metrics: Arc<ErrorMetrics>) -> Handler {
    Arc::new(
        move |_ctx: &mut MiddlewareContext, request: Request| -> BoxFuture<'static, Response> {
            let query = DashboardQuery::from_request(&request);
            let range = TimeRange::parse(query.range.as_deref());
            let report = ErrorMetricsReport::collect(&metrics, range);
            Box::pin(async move { Response::json(StatusCode::OK, &report) })
        },
    )
}

/// Handler returning the webhook health probe as JSON.
#[must_use]
pub fn webhook_health_handler(store: Arc<WebhookStatsStore>, thresholds: HealthThresholds) -> Handler {
    Arc::new(
        move |_ctx: &mut MiddlewareContext, _request: Request| -> BoxFuture<'static, Response> {
            let health = store.health(thresholds);
            Box::pin(async move { Response::json(StatusCode::OK, &health) })
        },
    )
}
