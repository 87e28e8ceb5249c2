//! Error interception middleware.
//!
//! Runs the downstream chain, then looks at the errors attached to the
//! context. If there are none the response passes through untouched.
//! Otherwise the last error is logged, rendered through the [`Responder`]
//! and recorded in the [`ErrorMetrics`] registry.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::responder::Responder;
use crate::types::{Request, RequestParts, Response};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use rampart_core::AppError;
use rampart_telemetry::{log_fields, ErrorMetrics, LogFields};
use std::sync::Arc;
use std::time::Instant;

/// Error interception middleware.
#[derive(Debug, Clone)]
pub struct ErrorHandlerMiddleware {
    responder: Arc<Responder>,
    metrics: Arc<ErrorMetrics>,
}

impl ErrorHandlerMiddleware {
    /// Creates an error handler rendering through `responder` and recording
    /// into `metrics`.
    #[must_use]
    pub const fn new(responder: Arc<Responder>, metrics: Arc<ErrorMetrics>) -> Self {
        Self { responder, metrics }
    }

    /// Uses the global logger and the global metrics registry.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(Responder::with_defaults()),
            rampart_telemetry::metrics::global(),
        )
    }

    /// Returns the responder.
    #[must_use]
    pub fn responder(&self) -> &Arc<Responder> {
        &self.responder
    }

    /// Returns the metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ErrorMetrics> {
        &self.metrics
    }

    fn handle(
        &self,
        ctx: &mut MiddlewareContext,
        parts: &RequestParts,
        downstream: &Response,
        started: Instant,
    ) -> Option<Response> {
        let errors = ctx.take_errors();
        let error = errors.last()?;

        self.responder
            .logger()
            .error("Request error", Some(error), request_fields(ctx, parts));

        let mut response = self
            .responder
            .respond_with_status(ctx, parts, error, ctx.committed_status());
        for (name, value) in downstream.headers() {
            if name != CONTENT_TYPE && name != CONTENT_LENGTH {
                response.headers_mut().append(name.clone(), value.clone());
            }
        }

        self.metrics.record(
            &error_kind(error),
            response.status().as_u16(),
            started.elapsed().as_secs_f64(),
            parts.path(),
        );

        ctx.mark_aborted();
        Some(response)
    }
}

/// Returns the metrics label for an error: its type tag, else its text.
#[must_use]
pub fn error_kind(error: &AppError) -> String {
    error
        .error_type()
        .map_or_else(|| error.to_string(), str::to_string)
}

fn request_fields(ctx: &MiddlewareContext, parts: &RequestParts) -> LogFields {
    let mut fields = log_fields! {
        "path" => parts.path(),
        "method" => parts.method.as_str(),
        "trace_id" => ctx.request_id().to_string(),
    };
    if let Some(user_id) = ctx.principal().and_then(|p| p.id()) {
        fields.insert("user_id".to_string(), user_id.into());
    }
    fields
}

impl Middleware for ErrorHandlerMiddleware {
    fn name(&self) -> &'static str {
        "error-handler"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let started = Instant::now();
            let parts = RequestParts::from_request(&request);

            let response = next.run(ctx, request).await;
            if ctx.errors().is_empty() {
                return response;
            }

            self.handle(ctx, &parts, &response, started)
                .unwrap_or(response)
        })
    }
}
