//! Panic recovery middleware.
//!
//! Wraps the whole chain. A panic anywhere downstream becomes a JSON 500 with
//! a tracking ID, and the recovered payload is logged under the same ID.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response, ResponseExt};
use futures_util::FutureExt;
use http::StatusCode;
use rampart_core::{generate_error_id, ErrorResponse};
use rampart_telemetry::{log_fields, Logger};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Message returned to the client after a recovered panic.
pub const PANIC_MESSAGE: &str = "An internal server error occurred";

/// Logged in place of a panic payload that is not a string.
pub const NON_STRING_PAYLOAD: &str = "non-string panic payload";

/// Panic recovery middleware.
#[derive(Debug, Clone)]
pub struct RecoveryMiddleware {
    logger: Arc<Logger>,
}

impl RecoveryMiddleware {
    /// Creates a recovery stage logging to `logger`.
    #[must_use]
    pub const fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    /// Creates a recovery stage logging to the global logger.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(rampart_telemetry::logger::global())
    }

    fn recovered(&self, ctx: &mut MiddlewareContext, path: &str, payload: &(dyn Any + Send)) -> Response {
        let error_id = generate_error_id();
        self.logger.error(
            "Panic recovered",
            None,
            log_fields! {
                "error_id" => error_id,
                "path" => path,
                "recovered" => panic_message(payload),
                "trace_id" => ctx.request_id().to_string(),
            },
        );
        ctx.mark_aborted();

        let body = ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), PANIC_MESSAGE)
            .with_id(error_id);
        Response::json(StatusCode::INTERNAL_SERVER_ERROR, &body)
    }
}

/// Extracts a printable message from a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or(NON_STRING_PAYLOAD)
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path().to_string();
            let outcome = AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await;
            match outcome {
                Ok(response) => response,
                Err(payload) => self.recovered(ctx, &path, payload.as_ref()),
            }
        })
    }
}
