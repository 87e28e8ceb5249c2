//! End-to-end pipeline integration tests.
//!
//! These tests run the stages together in canonical order:
//!
//! 1. Recovery
//! 2. Webhook monitor (webhook pipeline only)
//! 3. Error handler
//! 4. Rate limit
//! 5. Auth / Admin

use bytes::Bytes;
use http::{Method, Request as HttpRequest, StatusCode};
use http_body_util::Full;
use rampart_core::{AppError, ErrorResponse, SimplePrincipal};
use rampart_middleware::{
    context::MiddlewareContext,
    pipeline::{Pipeline, Stage},
    responder::Responder,
    stages::{
        AdminRequiredMiddleware, AuthRequiredMiddleware, ErrorHandlerMiddleware, RateLimiter,
        RecoveryMiddleware, WebhookMonitorMiddleware, WebhookStatsStore,
    },
    types::{body_bytes, Request, Response, ResponseExt},
    BoxFuture, Handler,
};
use rampart_telemetry::{ErrorMetrics, LogLevel, Logger, MemoryWriter};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    logger: Arc<Logger>,
    writer: MemoryWriter,
    metrics: Arc<ErrorMetrics>,
    limiter: RateLimiter,
}

impl Harness {
    fn new() -> Self {
        let (logger, writer) = Logger::in_memory();
        Self {
            logger: Arc::new(logger),
            writer,
            metrics: Arc::new(ErrorMetrics::new()),
            limiter: RateLimiter::new(),
        }
    }

    fn error_handler(&self) -> ErrorHandlerMiddleware {
        let responder = Arc::new(Responder::new(Arc::clone(&self.logger)));
        ErrorHandlerMiddleware::new(responder, Arc::clone(&self.metrics))
    }

    /// Login route: recovery, error handler, 5/min limit.
    fn login_pipeline(&self) -> Pipeline {
        Pipeline::builder()
            .add_stage(RecoveryMiddleware::new(Arc::clone(&self.logger)))
            .add_stage(self.error_handler())
            .add_stage(self.limiter.login())
            .build()
    }

    /// Admin routes: recovery, error handler, auth and admin gates.
    fn admin_pipeline(&self) -> Pipeline {
        Pipeline::builder()
            .add_stage(RecoveryMiddleware::new(Arc::clone(&self.logger)))
            .add_stage(self.error_handler())
            .add_stage(AuthRequiredMiddleware)
            .add_stage(AdminRequiredMiddleware)
            .build()
    }

    /// Webhook route: every stage but the gates.
    fn webhook_pipeline(&self, stats: Arc<WebhookStatsStore>) -> Pipeline {
        Pipeline::builder()
            .add_stage(RecoveryMiddleware::new(Arc::clone(&self.logger)))
            .add_stage(WebhookMonitorMiddleware::new(stats, Arc::clone(&self.logger)))
            .add_stage(self.error_handler())
            .add_stage(self.limiter.webhook())
            .build()
    }
}

fn ok_handler() -> Handler {
    Arc::new(
        |_ctx: &mut MiddlewareContext, _req: Request| -> BoxFuture<'static, Response> {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        },
    )
}

fn make_request(method: Method, path: &str, ip: &str, user_agent: &str) -> Request {
    HttpRequest::builder()
        .method(method)
        .uri(path)
        .header("accept", "application/json")
        .header("x-forwarded-for", ip)
        .header("user-agent", user_agent)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn error_body(response: Response) -> ErrorResponse {
    serde_json::from_slice(&body_bytes(response.into_body()).await).unwrap()
}

#[test]
fn test_canonical_stage_names_match_middleware() {
    let harness = Harness::new();
    let pipeline = harness.webhook_pipeline(Arc::new(WebhookStatsStore::new()));
    let expected: Vec<_> = [
        Stage::Recovery,
        Stage::WebhookMonitor,
        Stage::ErrorHandler,
        Stage::RateLimit,
    ]
    .iter()
    .map(|s| s.name())
    .collect();
    assert_eq!(pipeline.stage_names(), expected);

    let admin = harness.admin_pipeline();
    assert_eq!(
        admin.stage_names(),
        vec![
            Stage::Recovery.name(),
            Stage::ErrorHandler.name(),
            Stage::Auth.name(),
            Stage::Admin.name(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_login_limit_window() {
    let harness = Harness::new();
    let pipeline = harness.login_pipeline();
    let handler = ok_handler();

    for attempt in 1..=5 {
        let mut ctx = MiddlewareContext::new();
        ctx.set_matched_route("/login");
        let response = pipeline
            .dispatch(&mut ctx, make_request(Method::POST, "/login", "10.0.0.1", "Mozilla/5.0"), &handler)
            .await;
        assert_eq!(response.status(), StatusCode::OK, "attempt {attempt}");
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    }

    let mut ctx = MiddlewareContext::new();
    ctx.set_matched_route("/login");
    let response = pipeline
        .dispatch(&mut ctx, make_request(Method::POST, "/login", "10.0.0.1", "Mozilla/5.0"), &handler)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let body = error_body(response).await;
    assert_eq!(body.code, 429);
    assert_eq!(body.message, "Rate limit exceeded. Try again in 1m0s");
    assert_eq!(body.id, None);

    let stats = harness.metrics.stats();
    assert_eq!(stats.error_counts["validation_error"].count, 1);
    assert_eq!(stats.status_counts[&429].count, 1);
    assert_eq!(stats.endpoint_counts["/login"].count, 1);

    tokio::time::advance(Duration::from_secs(60)).await;

    let mut ctx = MiddlewareContext::new();
    ctx.set_matched_route("/login");
    let response = pipeline
        .dispatch(&mut ctx, make_request(Method::POST, "/login", "10.0.0.1", "Mozilla/5.0"), &handler)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_webhook_carve_out_and_limit() {
    let harness = Harness::new();
    let stats = Arc::new(WebhookStatsStore::new());
    let pipeline = harness.webhook_pipeline(Arc::clone(&stats));
    let handler = ok_handler();

    for _ in 0..15 {
        let mut ctx = MiddlewareContext::new();
        ctx.set_matched_route("/webhook");
        let response = pipeline
            .dispatch(
                &mut ctx,
                make_request(Method::POST, "/webhook", "54.187.174.169", "Stripe/1.0 (+https://stripe.com/docs/webhooks)"),
                &handler,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    for _ in 0..10 {
        let mut ctx = MiddlewareContext::new();
        ctx.set_matched_route("/webhook");
        let response = pipeline
            .dispatch(&mut ctx, make_request(Method::POST, "/webhook", "54.187.174.169", "SomeOther/1.0"), &handler)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let mut ctx = MiddlewareContext::new();
    ctx.set_matched_route("/webhook");
    let response = pipeline
        .dispatch(&mut ctx, make_request(Method::POST, "/webhook", "54.187.174.169", "SomeOther/1.0"), &handler)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // The monitor sees the rendered 429 body.
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.total_requests, 26);
    assert_eq!(snapshot.successful, 25);
    assert_eq!(snapshot.failed, 1);
    assert!(snapshot.last_error.contains("Rate limit exceeded"));
}

#[tokio::test]
async fn test_admin_gate_renders_auth_errors() {
    let harness = Harness::new();
    let pipeline = harness.admin_pipeline();
    let handler = ok_handler();

    let mut anonymous = MiddlewareContext::new();
    let response = pipeline
        .dispatch(&mut anonymous, make_request(Method::GET, "/admin/dashboard", "10.0.0.2", "Mozilla/5.0"), &handler)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        error_body(response).await,
        ErrorResponse::new(401, "Authentication required")
    );

    let mut user = MiddlewareContext::new();
    user.set_principal(Arc::new(SimplePrincipal::user(12)));
    let response = pipeline
        .dispatch(&mut user, make_request(Method::GET, "/admin/dashboard", "10.0.0.2", "Mozilla/5.0"), &handler)
        .await;
    assert_eq!(
        error_body(response).await,
        ErrorResponse::new(401, "Admin privileges required")
    );

    let request_errors: Vec<_> = harness
        .writer
        .entries()
        .into_iter()
        .filter(|e| e.message == "Request error")
        .collect();
    assert_eq!(request_errors.len(), 2);
    assert_eq!(request_errors[0].user_id, None);
    assert_eq!(request_errors[1].user_id, Some(12));

    let mut admin = MiddlewareContext::new();
    admin.set_principal(Arc::new(SimplePrincipal::admin(1)));
    let response = pipeline
        .dispatch(&mut admin, make_request(Method::GET, "/admin/dashboard", "10.0.0.2", "Mozilla/5.0"), &handler)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.metrics.stats().error_counts["auth_error"].count, 2);
}

#[tokio::test]
async fn test_internal_error_id_matches_log() {
    let harness = Harness::new();
    let pipeline = harness.admin_pipeline();

    let mut ctx = MiddlewareContext::new();
    ctx.set_principal(Arc::new(SimplePrincipal::admin(1)));
    let response = pipeline
        .run(
            &mut ctx,
            make_request(Method::POST, "/admin/orders/5/refund", "10.0.0.3", "Mozilla/5.0"),
            |ctx, _req| {
                ctx.push_error(AppError::internal_msg("boom"));
                let response = ctx.abort();
                Box::pin(async move { response })
            },
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body.message, "An internal error occurred");
    let id = body.id.expect("internal errors carry a tracking id");
    assert_eq!(id.len(), 16);

    let logged = harness
        .writer
        .entries()
        .into_iter()
        .find(|e| e.message == "Internal server error")
        .unwrap();
    assert_eq!(logged.level, LogLevel::Error);
    assert_eq!(logged.error.as_deref(), Some("boom"));
    assert_eq!(logged.fields["error_id"], id.as_str());
    assert_eq!(harness.metrics.stats().error_counts["boom"].count, 1);
}

#[tokio::test]
async fn test_panic_inside_full_pipeline() {
    let harness = Harness::new();
    let pipeline = harness.admin_pipeline();

    let mut ctx = MiddlewareContext::new();
    ctx.set_principal(Arc::new(SimplePrincipal::admin(1)));
    let response = pipeline
        .run(
            &mut ctx,
            make_request(Method::GET, "/admin/reports", "10.0.0.4", "Mozilla/5.0"),
            |_ctx, _req| panic!("report generator crashed"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body.message, "An internal server error occurred");
    assert!(body.id.is_some());

    let panic_entry = harness
        .writer
        .entries()
        .into_iter()
        .find(|e| e.message == "Panic recovered")
        .unwrap();
    assert_eq!(panic_entry.fields["recovered"], "report generator crashed");
    assert_eq!(panic_entry.path.as_deref(), Some("/admin/reports"));
}
