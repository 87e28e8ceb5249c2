//! # Rampart
//!
//! **Request-lifecycle control plane for commerce web applications**
//!
//! Rampart sits between an HTTP router and application handlers and provides:
//!
//! - **Error taxonomy** – A closed set of errors with a fixed status mapping
//! - **Negotiated error responses** – JSON, HTML or plain text per `Accept`
//! - **Structured logging** – One JSON line per event
//! - **Error metrics** – Counts, latencies and rates by kind, status and endpoint
//! - **Gates** – Authentication, admin and sliding-window rate limits
//! - **Recovery** – Panics become a 500 with a tracking ID
//! - **Webhook monitoring** – Delivery stats and a health probe
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rampart::prelude::*;
//!
//! # async fn serve(request: Request) -> Result<(), rampart::RampartError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("rampart.toml")?
//!     .with_env_prefix("RAMPART")
//!     .load()?;
//! let (plane, _guard) = ControlPlane::init(&config)?;
//!
//! let login = plane.login_pipeline();
//! let handler = plane.no_route();
//! let mut ctx = MiddlewareContext::new();
//! ctx.set_matched_route("/login");
//! let response = login.dispatch(&mut ctx, request, &handler).await;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Recovery → WebhookMonitor → ErrorHandler → RateLimit → Auth → Admin → Handler
//! ```

#![doc(html_root_url = "https://docs.rs/rampart/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod stack;

pub use stack::{ControlPlane, RampartError};

// Re-export core types
pub use rampart_core as core;

// Re-export middleware types
pub use rampart_middleware as middleware;

// Re-export telemetry types
pub use rampart_telemetry as telemetry;

// Re-export configuration types
pub use rampart_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use rampart::prelude::*;
///
/// let err = AppError::not_found("Gun not found");
/// assert_eq!(err.status_code().as_u16(), 404);
/// ```
pub mod prelude {
    pub use crate::{ControlPlane, RampartError};

    pub use rampart_core::{AppError, AppResult, ErrorKind, ErrorResponse, Principal, SimplePrincipal};

    pub use rampart_middleware::{
        BoxFuture, Handler, Middleware, MiddlewareContext, Next, Pipeline, Request, Response,
        ResponseExt,
    };

    pub use rampart_middleware::stages::{
        AdminRequiredMiddleware, AuthRequiredMiddleware, ErrorHandlerMiddleware,
        RateLimitMiddleware, RateLimiter, RecoveryMiddleware, WebhookMonitorMiddleware,
    };

    pub use rampart_telemetry::{log_fields, ErrorMetrics, Logger};

    pub use rampart_config::{ConfigLoader, RampartConfig};
}
