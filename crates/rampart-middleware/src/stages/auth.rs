//! Authentication and admin gates.
//!
//! Identity is attached upstream by the host. These gates only check what is
//! attached; they never render. A rejected request gets an
//! [`AppError::Auth`] on the context and the chain is aborted.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use rampart_core::AppError;

/// Message attached when no principal is present.
pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";

/// Message attached when the principal is not an admin.
pub const ADMIN_REQUIRED: &str = "Admin privileges required";

/// Rejects requests without an attached principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthRequiredMiddleware;

impl Middleware for AuthRequiredMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if ctx.principal().is_none() {
                ctx.push_error(AppError::auth(AUTHENTICATION_REQUIRED));
                return ctx.abort();
            }
            next.run(ctx, request).await
        })
    }
}

/// Rejects requests whose principal is missing or not an admin.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminRequiredMiddleware;

impl Middleware for AdminRequiredMiddleware {
    fn name(&self) -> &'static str {
        "admin"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let rejection = match ctx.principal() {
                None => Some(AUTHENTICATION_REQUIRED),
                Some(principal) if !principal.is_admin() => Some(ADMIN_REQUIRED),
                Some(_) => None,
            };

            if let Some(message) = rejection {
                tracing::debug!(request_id = %ctx.request_id(), reason = message, "Admin gate rejected request");
                ctx.push_error(AppError::auth(message));
                return ctx.abort();
            }
            next.run(ctx, request).await
        })
    }
}
