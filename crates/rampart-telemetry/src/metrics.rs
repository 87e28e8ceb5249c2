//! In-memory error metrics.
//!
//! [`ErrorMetrics`] keeps three views of the same event stream: by error
//! kind label, by endpoint path and by HTTP status code. Each entry tracks a
//! cumulative count, the last occurrence, the last path and parallel latency
//! and timestamp series.
//!
//! # Exported Metrics
//!
//! Every recorded event is also mirrored to the `metrics` facade. Without an
//! installed recorder this is a no-op.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `rampart_errors_total` | Counter | `kind`, `status` | Errors recorded |
//! | `rampart_error_latency_seconds` | Histogram | `kind` | Latency of failed requests |
//!
//! # Example
//!
//! ```
//! use rampart_telemetry::ErrorMetrics;
//!
//! let metrics = ErrorMetrics::new();
//! metrics.record("auth_error", 401, 0.5, "/login");
//! metrics.record("auth_error", 401, 0.7, "/login");
//!
//! let stats = metrics.stats();
//! assert_eq!(stats.error_counts["auth_error"].count, 2);
//! assert_eq!(stats.status_counts[&401].count, 2);
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default interval between background cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default age after which idle entries are reset.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Metric name constants.
pub mod names {
    /// Errors recorded.
    pub const ERRORS_TOTAL: &str = "rampart_errors_total";

    /// Latency of failed requests.
    pub const ERROR_LATENCY: &str = "rampart_error_latency_seconds";
}

/// Background cleanup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Seconds between cleanup sweeps.
    pub cleanup_interval_secs: u64,

    /// Entries idle for longer than this many seconds are reset.
    pub max_age_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL.as_secs(),
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
        }
    }
}

impl MetricsConfig {
    /// Returns the cleanup interval.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Returns the max entry age.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Aggregate for one key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Events since creation or the last reset.
    pub count: u64,
    /// Most recent event.
    pub last_occurred: DateTime<Utc>,
    /// Latencies in seconds, in insertion order.
    pub latencies: Vec<f64>,
    /// Path of the most recent event.
    pub path: String,
    /// Event timestamps, parallel to `latencies`.
    pub timestamps: Vec<DateTime<Utc>>,
}

impl ErrorEntry {
    /// Mean latency in seconds, or 0 with no samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_latency(&self) -> f64 {
        if self.latencies.is_empty() {
            return 0.0;
        }
        self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
    }

    fn observe(&mut self, latency: f64, path: &str, at: DateTime<Utc>) {
        self.count += 1;
        self.last_occurred = at;
        path.clone_into(&mut self.path);
        self.latencies.push(latency);
        self.timestamps.push(at);
    }

    fn reset(&mut self) {
        self.count = 0;
        self.latencies = Vec::new();
        self.timestamps = Vec::new();
    }
}

/// Snapshot of the three views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    /// Keyed by error kind label.
    pub error_counts: HashMap<String, ErrorEntry>,
    /// Keyed by HTTP status code.
    pub status_counts: HashMap<u16, ErrorEntry>,
    /// Keyed by endpoint path.
    pub endpoint_counts: HashMap<String, ErrorEntry>,
}

/// Per-kind summary returned by [`ErrorMetrics::recent_errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentError {
    /// Error kind label.
    pub kind: String,
    /// Cumulative count.
    pub count: u64,
    /// Most recent event.
    pub last_occurred: DateTime<Utc>,
    /// Path of the most recent event.
    pub path: String,
}

/// Latency percentiles across all error kinds, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// Median.
    pub p50: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
}

/// Concurrent error metrics registry.
///
/// A single reader-writer lock guards all three views: `record` and `cleanup`
/// take it exclusively, every query takes it shared.
#[derive(Debug, Default)]
pub struct ErrorMetrics {
    inner: RwLock<ErrorStats>,
}

impl ErrorMetrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one event stamped with the current time.
    pub fn record(&self, kind: &str, status: u16, latency: f64, path: &str) {
        self.record_at(kind, status, latency, path, Utc::now());
    }

    /// Records one event at an explicit time.
    pub fn record_at(&self, kind: &str, status: u16, latency: f64, path: &str, at: DateTime<Utc>) {
        {
            let mut stats = self.inner.write();
            stats
                .error_counts
                .entry(kind.to_string())
                .or_default()
                .observe(latency, path, at);
            stats
                .status_counts
                .entry(status)
                .or_default()
                .observe(latency, path, at);
            stats
                .endpoint_counts
                .entry(path.to_string())
                .or_default()
                .observe(latency, path, at);
        }

        counter!(names::ERRORS_TOTAL, "kind" => kind.to_string(), "status" => status.to_string())
            .increment(1);
        histogram!(names::ERROR_LATENCY, "kind" => kind.to_string()).record(latency);
    }

    /// Returns a snapshot of all three views.
    #[must_use]
    pub fn stats(&self) -> ErrorStats {
        self.inner.read().clone()
    }

    /// Returns up to `limit` per-kind summaries, newest first.
    #[must_use]
    pub fn recent_errors(&self, limit: usize) -> Vec<RecentError> {
        let mut recent: Vec<RecentError> = self
            .inner
            .read()
            .error_counts
            .iter()
            .map(|(kind, entry)| RecentError {
                kind: kind.clone(),
                count: entry.count,
                last_occurred: entry.last_occurred,
                path: entry.path.clone(),
            })
            .collect();

        recent.sort_by(|a, b| b.last_occurred.cmp(&a.last_occurred));
        recent.truncate(limit);
        recent
    }

    /// Per-kind event counts within `window` of now.
    #[must_use]
    pub fn error_rates(&self, window: Duration) -> HashMap<String, u64> {
        self.error_rates_at(window, Utc::now())
    }

    /// Per-kind event counts with timestamp `>= reference - window`.
    #[must_use]
    pub fn error_rates_at(&self, window: Duration, reference: DateTime<Utc>) -> HashMap<String, u64> {
        let cutoff = cutoff(reference, window);
        self.inner
            .read()
            .error_counts
            .iter()
            .map(|(kind, entry)| {
                let count = entry.timestamps.iter().filter(|ts| **ts >= cutoff).count();
                (kind.clone(), count as u64)
            })
            .collect()
    }

    /// Nearest-rank percentiles across every per-kind latency series.
    #[must_use]
    pub fn latency_percentiles(&self) -> LatencyPercentiles {
        let mut all: Vec<f64> = self
            .inner
            .read()
            .error_counts
            .values()
            .flat_map(|entry| entry.latencies.iter().copied())
            .collect();
        all.sort_by(f64::total_cmp);

        LatencyPercentiles {
            p50: percentile(&all, 0.50),
            p95: percentile(&all, 0.95),
            p99: percentile(&all, 0.99),
        }
    }

    /// Resets entries idle for longer than `max_age`. Returns how many were reset.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.cleanup_at(max_age, Utc::now())
    }

    /// Resets entries whose last occurrence is before `now - max_age`.
    ///
    /// Keys survive with a zero count and empty series.
    pub fn cleanup_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, max_age);
        let mut stats = self.inner.write();
        let ErrorStats {
            error_counts,
            status_counts,
            endpoint_counts,
        } = &mut *stats;

        error_counts
            .values_mut()
            .chain(status_counts.values_mut())
            .chain(endpoint_counts.values_mut())
            .filter(|entry| entry.last_occurred < cutoff)
            .fold(0, |reset, entry| {
                entry.reset();
                reset + 1
            })
    }

    /// Starts a background task resetting stale entries every `interval`.
    ///
    /// The task holds a weak reference and exits once the registry is dropped.
    /// Must be called from within a Tokio runtime.
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let period = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let reset = registry.cleanup(max_age);
                tracing::debug!(reset, "Error metrics cleanup");
            }
        })
    }
}

/// Nearest-rank percentile of an ascending series: `sorted[floor((n-1)*p)]`.
///
/// Returns 0 for an empty series.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let last = sorted.len() - 1;
    let index = ((last as f64) * p.clamp(0.0, 1.0)).floor() as usize;
    sorted[index.min(last)]
}

fn cutoff(reference: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    let span = TimeDelta::from_std(span).unwrap_or(TimeDelta::MAX);
    reference
        .checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Registers descriptions for the exported metrics.
pub fn describe_metrics() {
    describe_counter!(names::ERRORS_TOTAL, "Total number of errors recorded");
    describe_histogram!(
        names::ERROR_LATENCY,
        metrics::Unit::Seconds,
        "Latency of requests that ended in an error"
    );
}

static GLOBAL_METRICS: OnceLock<Arc<ErrorMetrics>> = OnceLock::new();
static CLEANUP_STARTED: AtomicBool = AtomicBool::new(false);

/// Returns the process-wide registry.
///
/// The first call made inside a Tokio runtime starts the background cleanup
/// task with the default interval and max age.
pub fn global() -> Arc<ErrorMetrics> {
    let registry = Arc::clone(GLOBAL_METRICS.get_or_init(|| Arc::new(ErrorMetrics::new())));
    start_global_cleanup(&MetricsConfig::default());
    registry
}

/// Starts the global registry's cleanup task with explicit settings.
///
/// Returns `false` if the task is already running or no Tokio runtime is
/// available.
pub fn start_global_cleanup(config: &MetricsConfig) -> bool {
    if tokio::runtime::Handle::try_current().is_err() {
        return false;
    }
    if CLEANUP_STARTED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }

    let registry = GLOBAL_METRICS.get_or_init(|| Arc::new(ErrorMetrics::new()));
    drop(registry.spawn_cleanup(config.cleanup_interval(), config.max_age()));
    true
}
