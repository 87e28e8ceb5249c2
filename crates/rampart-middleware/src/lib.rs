//! # Rampart Middleware
//!
//! Request-lifecycle middleware for rampart.
//!
//! Stages attach taxonomy errors to the [`MiddlewareContext`] and abort; the
//! error handler renders the last one on the way out.
//!
//! ```text
//! Request → Recovery → WebhookMonitor → ErrorHandler → RateLimit → Auth → Admin → Handler
//!                                            ↓
//!                           Responder · Logger · ErrorMetrics
//! ```
//!
//! | Stage | Middleware | Purpose |
//! |-------|------------|---------|
//! | 1 | [`RecoveryMiddleware`](stages::RecoveryMiddleware) | Panic → JSON 500 with tracking ID |
//! | 2 | [`WebhookMonitorMiddleware`](stages::WebhookMonitorMiddleware) | Webhook delivery stats (webhook routes only) |
//! | 3 | [`ErrorHandlerMiddleware`](stages::ErrorHandlerMiddleware) | Render, log and record the last error |
//! | 4 | [`RateLimitMiddleware`](stages::RateLimitMiddleware) | Sliding-window limit per client and route |
//! | 5 | [`AuthRequiredMiddleware`](stages::AuthRequiredMiddleware) | Require a principal |
//! | 6 | [`AdminRequiredMiddleware`](stages::AdminRequiredMiddleware) | Require an admin principal |
//!
//! ## Example
//!
//! ```
//! use rampart_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 6);
//! assert_eq!(stages[0].name(), "recovery");
//! assert_eq!(stages[2].name(), "error-handler");
//! ```

#![doc(html_root_url = "https://docs.rs/rampart-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod pipeline;
pub mod responder;
pub mod stages;
pub mod types;

pub use context::MiddlewareContext;
pub use handlers::{
    error_metrics_handler, no_method_handler, no_route_handler, webhook_health_handler,
    ErrorMetricsReport, TimeRange,
};
pub use middleware::{BoxFuture, Handler, Middleware, Next};
pub use pipeline::{BoxedMiddleware, Pipeline, PipelineBuilder, Stage};
pub use responder::{BuiltinErrorTemplate, RenderError, Responder, TemplateRenderer};
pub use types::{Request, RequestParts, Response, ResponseExt};
