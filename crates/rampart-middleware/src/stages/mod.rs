//! Control-plane middleware stages.
//!
//! In canonical order (see [`Stage`](crate::pipeline::Stage)):
//!
//! 1. [`recovery`] - Panic recovery
//! 2. [`webhook`] - Webhook response capture and health
//! 3. [`error_handler`] - Error rendering, logging and metrics
//! 4. [`rate_limit`] - Sliding-window rate limiting
//! 5. [`auth`] - Authentication and admin gates

pub mod auth;
pub mod error_handler;
pub mod rate_limit;
pub mod recovery;
pub mod webhook;

pub use auth::{AdminRequiredMiddleware, AuthRequiredMiddleware};
pub use error_handler::ErrorHandlerMiddleware;
pub use rate_limit::{RateLimitMiddleware, RateLimiter};
pub use recovery::RecoveryMiddleware;
pub use webhook::{
    HealthStatus, HealthThresholds, WebhookHealth, WebhookMonitorMiddleware, WebhookStats,
    WebhookStatsStore,
};
