//! Core middleware trait and chain types.
//!
//! Every stage of the control plane implements [`Middleware`]. A stage
//! receives the shared [`MiddlewareContext`], the request, and a [`Next`]
//! continuation. Gates short-circuit by pushing an error onto the context and
//! returning [`MiddlewareContext::abort`] instead of running `next`.
//!
//! # Example
//!
//! ```
//! use rampart_middleware::{BoxFuture, Middleware, MiddlewareContext, Next, Request, Response};
//! use rampart_core::AppError;
//!
//! struct ClosedForMaintenance;
//!
//! impl Middleware for ClosedForMaintenance {
//!     fn name(&self) -> &'static str {
//!         "maintenance"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         _request: Request,
//!         _next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             ctx.push_error(AppError::not_found("Store is closed"));
//!             ctx.abort()
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shareable request handler placed at the end of a pipeline.
///
/// The handler works on the context synchronously and returns a future that
/// does not borrow it. To fail, it pushes an error and returns
/// [`MiddlewareContext::abort`].
pub type Handler =
    Arc<dyn Fn(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// The core middleware trait.
///
/// # Invariants
///
/// - A stage calls `next.run()` at most once
/// - A stage that does not call `next` has aborted the context
/// - A stage never renders a taxonomy error itself; the error handler does
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// Callback to invoke the next middleware in the chain.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(
        Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a>,
    ),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    ///
    /// This consumes `self` so it can only be called once.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => middleware.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use rampart_core::AppError;

    struct VisitMiddleware {
        name: &'static str,
    }

    impl Middleware for VisitMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                let mut visited = ctx.remove_extension::<Vec<&'static str>>().unwrap_or_default();
                visited.push(self.name);
                ctx.set_extension(visited);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/cart")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        });

        let response = next.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain() {
        let mw1 = VisitMiddleware { name: "first" };
        let mw2 = VisitMiddleware { name: "second" };
        let mut ctx = MiddlewareContext::new();

        let handler = Next::handler(|_ctx, _req| {
            Box::pin(async { Response::text(StatusCode::OK, "OK") })
        });
        let next1 = Next::new(&mw1, Next::new(&mw2, handler));

        let response = next1.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            ctx.get_extension::<Vec<&'static str>>(),
            Some(&vec!["first", "second"])
        );
    }

    #[tokio::test]
    async fn test_handler_reports_error_through_context() {
        let mut ctx = MiddlewareContext::new();
        let next = Next::handler(|ctx, _req| {
            ctx.push_error(AppError::not_found("Gun not found"));
            let response = ctx.abort();
            Box::pin(async move { response })
        });

        let response = next.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(ctx.is_aborted());
    }
}
