//! Sliding-window rate limiting middleware.
//!
//! Each `(client IP, route)` pair owns an ordered list of admission
//! timestamps. On every request the list is trimmed to the half-open window
//! `(now - window, now]`; if what remains already holds `limit` entries the
//! request is rejected with 429, otherwise `now` is appended and the request
//! proceeds.
//!
//! Several limits can share one store through [`RateLimiter`], mirroring a
//! single process-wide map guarded by one mutex.
//!
//! ## Example
//!
//! ```
//! use rampart_middleware::stages::RateLimiter;
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new();
//! let login = limiter.login();
//! assert_eq!(login.limit(), 5);
//! assert_eq!(login.window(), Duration::from_secs(60));
//!
//! let custom = limiter.rate_limit(100, Duration::from_secs(10));
//! assert_eq!(custom.limit(), 100);
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use http::{header, HeaderValue, StatusCode};
use rampart_core::AppError;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in the current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Key used when no client address can be determined.
pub const UNKNOWN_IP: &str = "unknown-ip";

/// Route whose payment-provider traffic bypasses the limiter.
pub const DEFAULT_WEBHOOK_ROUTE: &str = "/webhook";

/// User-Agent prefix identifying payment-provider webhook deliveries.
pub const WEBHOOK_USER_AGENT_PREFIX: &str = "Stripe/";

/// Admissions between idle-key sweeps.
pub const DEFAULT_SWEEP_EVERY: u64 = 1024;

/// Login preset: 5 requests per minute.
pub const LOGIN_LIMIT: (usize, Duration) = (5, Duration::from_secs(60));

/// Password-reset preset: 3 requests per hour.
pub const PASSWORD_RESET_LIMIT: (usize, Duration) = (3, Duration::from_secs(60 * 60));

/// Webhook preset: 10 requests per minute.
pub const WEBHOOK_LIMIT: (usize, Duration) = (10, Duration::from_secs(60));

#[derive(Debug, Default)]
struct RateLimitStore {
    buckets: HashMap<String, Bucket>,
    admissions: u64,
}

#[derive(Debug)]
struct Bucket {
    window: Duration,
    hits: VecDeque<Instant>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl Bucket {
    const fn new(window: Duration) -> Self {
        Self {
            window,
            hits: VecDeque::new(),
        }
    }

    /// Drops every hit at or before `now - window`.
    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.hits.front().is_some_and(|&hit| hit <= cutoff) {
            self.hits.pop_front();
        }
    }

    fn admit(&mut self, now: Instant, limit: usize) -> Decision {
        self.prune(now);

        if self.hits.len() >= limit {
            let retry_after = self
                .hits
                .front()
                .map_or(self.window, |&oldest| (oldest + self.window).saturating_duration_since(now));
            return Decision::Limited { retry_after };
        }

        self.hits.push_back(now);
        Decision::Allowed {
            remaining: limit - self.hits.len(),
        }
    }
}

impl RateLimitStore {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.prune(now);
            !bucket.hits.is_empty()
        });
        before - self.buckets.len()
    }
}

#[derive(Debug, Clone)]
struct LimiterOptions {
    sweep_every: u64,
    headers: bool,
    webhook_route: String,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        Self {
            sweep_every: DEFAULT_SWEEP_EVERY,
            headers: true,
            webhook_route: DEFAULT_WEBHOOK_ROUTE.to_string(),
        }
    }
}

/// Shared store from which rate limit stages are created.
///
/// Every stage created from one limiter shares its map and mutex.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    store: Arc<Mutex<RateLimitStore>>,
    options: LimiterOptions,
}

impl RateLimiter {
    /// Creates a limiter with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many admissions pass between idle-key sweeps.
    #[must_use]
    pub fn with_sweep_every(mut self, admissions: u64) -> Self {
        self.options.sweep_every = admissions.max(1);
        self
    }

    /// Enables or disables the `x-ratelimit-*` and `retry-after` headers.
    #[must_use]
    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.options.headers = enabled;
        self
    }

    /// Sets the route whose payment-provider traffic is never limited.
    #[must_use]
    pub fn with_webhook_route(mut self, route: impl Into<String>) -> Self {
        self.options.webhook_route = route.into();
        self
    }

    /// Creates a stage admitting `limit` requests per `window`.
    #[must_use]
    pub fn rate_limit(&self, limit: usize, window: Duration) -> RateLimitMiddleware {
        RateLimitMiddleware {
            limit,
            window,
            store: Arc::clone(&self.store),
            options: self.options.clone(),
        }
    }

    /// Login preset, 5 per minute.
    #[must_use]
    pub fn login(&self) -> RateLimitMiddleware {
        self.rate_limit(LOGIN_LIMIT.0, LOGIN_LIMIT.1)
    }

    /// Password-reset preset, 3 per hour.
    #[must_use]
    pub fn password_reset(&self) -> RateLimitMiddleware {
        self.rate_limit(PASSWORD_RESET_LIMIT.0, PASSWORD_RESET_LIMIT.1)
    }

    /// Webhook preset, 10 per minute.
    #[must_use]
    pub fn webhook(&self) -> RateLimitMiddleware {
        self.rate_limit(WEBHOOK_LIMIT.0, WEBHOOK_LIMIT.1)
    }

    /// Returns the number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.store.lock().await.buckets.len()
    }
}

/// Rate limiting middleware.
///
/// Rejected requests get a [`AppError::Validation`] with a message naming the
/// window, and a committed 429 status.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limit: usize,
    window: Duration,
    store: Arc<Mutex<RateLimitStore>>,
    options: LimiterOptions,
}

impl RateLimitMiddleware {
    /// Creates a stage with its own private store.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        RateLimiter::new().rate_limit(limit, window)
    }

    /// Returns the maximum admissions per window.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the message attached to rejected requests.
    #[must_use]
    pub fn exceeded_message(&self) -> String {
        format!(
            "Rate limit exceeded. Try again in {}",
            format_duration(self.window)
        )
    }

    fn is_carved_out(&self, ctx: &MiddlewareContext, request: &Request) -> bool {
        ctx.route_or(request.uri().path()) == self.options.webhook_route
            && request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ua| ua.starts_with(WEBHOOK_USER_AGENT_PREFIX))
    }

    /// Builds the `"<client-ip>:<route>"` key.
    fn key(ctx: &MiddlewareContext, request: &Request) -> String {
        let ip = client_ip(ctx, request);
        format!("{ip}:{}", ctx.route_or(request.uri().path()))
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn check(&self, key: &str) -> Decision {
        let mut store = self.store.lock().await;
        let now = Instant::now();

        let bucket = store
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.window));
        bucket.window = self.window;
        let decision = bucket.admit(now, self.limit);

        store.admissions += 1;
        if store.admissions % self.options.sweep_every == 0 {
            let removed = store.sweep(now);
            tracing::debug!(removed, remaining = store.buckets.len(), "Rate limit sweep");
        }

        decision
    }

    fn add_headers(&self, response: &mut Response, remaining: usize) {
        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(self.limit));
        headers.insert(headers::REMAINING, HeaderValue::from(remaining));
    }
}

/// Resolves the client IP: first `X-Forwarded-For` hop, then `X-Real-IP`,
/// then the peer address, then [`UNKNOWN_IP`].
#[must_use]
pub fn client_ip(ctx: &MiddlewareContext, request: &Request) -> String {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    ctx.client_addr()
        .map_or_else(|| UNKNOWN_IP.to_string(), |addr| addr.to_string())
}

/// Formats a duration the way Go's `time.Duration` prints, e.g. `1m0s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }

    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        let _ = write!(out, "{seconds}s");
    } else {
        let fraction = format!("{nanos:09}");
        let _ = write!(out, "{seconds}.{}s", fraction.trim_end_matches('0'));
    }
    out
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.is_carved_out(ctx, &request) {
                return next.run(ctx, request).await;
            }

            let key = Self::key(ctx, &request);
            match self.check(&key).await {
                Decision::Allowed { remaining } => {
                    let mut response = next.run(ctx, request).await;
                    if self.options.headers {
                        self.add_headers(&mut response, remaining);
                    }
                    response
                }
                Decision::Limited { retry_after } => {
                    tracing::debug!(key = %key, limit = self.limit, "Rate limit exceeded");
                    ctx.push_error(AppError::validation(self.exceeded_message()));
                    let mut response = ctx.abort_with_status(StatusCode::TOO_MANY_REQUESTS);
                    if self.options.headers {
                        self.add_headers(&mut response, 0);
                        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                        response
                            .headers_mut()
                            .insert(headers::RETRY_AFTER, HeaderValue::from(secs.max(1)));
                    }
                    response
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Method, Request as HttpRequest};
    use http_body_util::Full;
    use proptest::prelude::*;

    fn request(uri: &str, ip: &str, user_agent: &str) -> Request {
        HttpRequest::builder()
            .method(Method::POST)
            .uri(uri)
            .header("x-forwarded-for", ip)
            .header("user-agent", user_agent)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn hit(limiter: &RateLimitMiddleware, req: Request) -> (StatusCode, MiddlewareContext) {
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        });
        let response = limiter.process(&mut ctx, req, next).await;
        (response.status(), ctx)
    }

    #[test]
    fn test_presets() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.login().limit(), 5);
        assert_eq!(limiter.password_reset().window(), Duration::from_secs(3600));
        assert_eq!(limiter.webhook().limit(), 10);
    }

    #[test]
    fn test_exceeded_message() {
        assert_eq!(
            RateLimitMiddleware::new(5, Duration::from_secs(60)).exceeded_message(),
            "Rate limit exceeded. Try again in 1m0s"
        );
        assert_eq!(
            RateLimitMiddleware::new(3, Duration::from_secs(3600)).exceeded_message(),
            "Rate limit exceeded. Try again in 1h0m0s"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(7322)), "2h2m2s");
    }

    #[test]
    fn test_client_ip_resolution() {
        let ctx = MiddlewareContext::new();
        let req = request("/login", "192.168.1.1, 10.0.0.1", "curl/8");
        assert_eq!(client_ip(&ctx, &req), "192.168.1.1");

        let req: Request = HttpRequest::builder()
            .uri("/login")
            .header("x-real-ip", "172.16.0.9")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(client_ip(&ctx, &req), "172.16.0.9");

        let bare: Request = HttpRequest::builder()
            .uri("/login")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(client_ip(&ctx, &bare), UNKNOWN_IP);

        let mut ctx = MiddlewareContext::new();
        ctx.set_client_addr("10.1.2.3".parse().unwrap());
        assert_eq!(client_ip(&ctx, &bare), "10.1.2.3");
    }

    #[test]
    fn test_key_uses_matched_route() {
        let mut ctx = MiddlewareContext::new();
        let req = request("/reset/abc123", "1.2.3.4", "curl/8");
        assert_eq!(RateLimitMiddleware::key(&ctx, &req), "1.2.3.4:/reset/abc123");

        ctx.set_matched_route("/reset/:token");
        assert_eq!(RateLimitMiddleware::key(&ctx, &req), "1.2.3.4:/reset/:token");
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_window_expiry() {
        let limiter = RateLimitMiddleware::new(2, Duration::from_secs(10));

        for _ in 0..2 {
            let (status, _) = hit(&limiter, request("/login", "1.1.1.1", "curl/8")).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, ctx) = hit(&limiter, request("/login", "1.1.1.1", "curl/8")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ctx.committed_status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(
            ctx.last_error().unwrap().message(),
            "Rate limit exceeded. Try again in 10s"
        );

        let (status, _) = hit(&limiter, request("/login", "2.2.2.2", "curl/8")).await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::advance(Duration::from_secs(10)).await;
        let (status, _) = hit(&limiter, request("/login", "1.1.1.1", "curl/8")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers() {
        let limiter = RateLimitMiddleware::new(1, Duration::from_secs(30));
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        });
        let response = limiter
            .process(&mut ctx, request("/login", "1.1.1.1", "curl/8"), next)
            .await;
        assert_eq!(response.headers()[headers::LIMIT], "1");
        assert_eq!(response.headers()[headers::REMAINING], "0");

        tokio::time::advance(Duration::from_secs(12)).await;
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        });
        let response = limiter
            .process(&mut ctx, request("/login", "1.1.1.1", "curl/8"), next)
            .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[headers::RETRY_AFTER], "18");
    }

    #[tokio::test(start_paused = true)]
    async fn test_webhook_carve_out() {
        let limiter = RateLimiter::new().webhook();

        for _ in 0..15 {
            let (status, _) = hit(&limiter, request("/webhook", "3.3.3.3", "Stripe/1.0 (+https://stripe.com)")).await;
            assert_eq!(status, StatusCode::OK);
        }

        for _ in 0..10 {
            let (status, _) = hit(&limiter, request("/webhook", "3.3.3.3", "SomeOther/1.0")).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = hit(&limiter, request("/webhook", "3.3.3.3", "SomeOther/1.0")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_store_and_sweep() {
        let limiter = RateLimiter::new().with_sweep_every(4);
        let login = limiter.login();
        let reset = limiter.password_reset();

        hit(&login, request("/login", "1.1.1.1", "curl/8")).await;
        hit(&reset, request("/reset", "1.1.1.1", "curl/8")).await;
        assert_eq!(limiter.tracked_keys().await, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        hit(&login, request("/login", "2.2.2.2", "curl/8")).await;
        hit(&login, request("/login", "3.3.3.3", "curl/8")).await;

        // The sweep dropped the expired login key but kept the hour-long reset key.
        assert_eq!(limiter.tracked_keys().await, 3);
    }

    proptest! {
        #[test]
        fn prop_bucket_stays_within_window(
            limit in 1usize..8,
            window_ms in 1u64..5_000,
            gaps in proptest::collection::vec(0u64..2_000, 1..60),
        ) {
            let window = Duration::from_millis(window_ms);
            let mut bucket = Bucket::new(window);
            let mut now = Instant::now();

            for gap in gaps {
                now += Duration::from_millis(gap);
                let decision = bucket.admit(now, limit);

                prop_assert!(bucket.hits.len() <= limit);
                prop_assert!(bucket.hits.iter().all(|&hit| hit <= now && now - hit < window));
                if let Decision::Allowed { .. } = decision {
                    prop_assert_eq!(bucket.hits.back().copied(), Some(now));
                }
            }
        }
    }
}
