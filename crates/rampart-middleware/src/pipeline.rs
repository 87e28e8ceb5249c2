//! Ordered middleware pipeline.
//!
//! A [`Pipeline`] is an immutable, ordered list of stages wrapped around a
//! terminal handler. The canonical order of the control plane is:
//!
//! 1. **Recovery** - Turn panics into a JSON 500 with a tracking ID
//! 2. **Webhook monitor** - Capture status and body of webhook responses
//! 3. **Error handler** - Render, log and record the last attached error
//! 4. **Rate limit** - Sliding-window admission per client and route
//! 5. **Auth** - Require an attached principal
//! 6. **Admin** - Require an admin principal
//!
//! The error handler sits outside the gates so it can render what they
//! attach, and inside recovery and the webhook monitor so both observe the
//! rendered response.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Handler, Middleware, Next};
use crate::types::{Request, Response};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered middleware pipeline.
///
/// # Example
///
/// ```
/// use rampart_middleware::pipeline::Pipeline;
/// use rampart_middleware::stages::{AuthRequiredMiddleware, RecoveryMiddleware};
///
/// let pipeline = Pipeline::builder()
///     .add_stage(RecoveryMiddleware::with_defaults())
///     .add_stage(AuthRequiredMiddleware)
///     .build();
///
/// assert_eq!(pipeline.stage_names(), vec!["recovery", "auth"]);
/// ```
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through every stage and then `handler`.
    pub async fn process<H>(&self, mut ctx: MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        self.run(&mut ctx, request, handler).await
    }

    /// Like [`process`](Self::process), but leaves the context with the
    /// caller so it can be inspected afterwards.
    pub async fn run<H>(&self, ctx: &mut MiddlewareContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(ctx, request).await
    }

    /// Processes a request with a shared [`Handler`].
    pub async fn dispatch(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: &Handler,
    ) -> Response {
        let handler = Arc::clone(handler);
        self.run(ctx, request, move |ctx, request| handler(ctx, request))
            .await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Earlier stages wrap later ones.
    #[must_use]
    pub fn add_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn add_shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// Stage marker describing the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Panic recovery.
    Recovery = 1,
    /// Webhook response capture.
    WebhookMonitor = 2,
    /// Error rendering, logging and metrics.
    ErrorHandler = 3,
    /// Sliding-window rate limiting.
    RateLimit = 4,
    /// Principal presence gate.
    Auth = 5,
    /// Admin capability gate.
    Admin = 6,
}

impl Stage {
    /// Returns the stage name, matching [`Middleware::name`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::WebhookMonitor => "webhook-monitor",
            Self::ErrorHandler => "error-handler",
            Self::RateLimit => "rate-limit",
            Self::Auth => "auth",
            Self::Admin => "admin",
        }
    }

    /// Returns true for the stages that may reject a request.
    #[must_use]
    pub const fn is_gate(self) -> bool {
        matches!(self, Self::RateLimit | Self::Auth | Self::Admin)
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::Recovery,
            Self::WebhookMonitor,
            Self::ErrorHandler,
            Self::RateLimit,
            Self::Auth,
            Self::Admin,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Request as HttpRequest, StatusCode};
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OrderTrackingMiddleware {
        name: &'static str,
        counter: Arc<AtomicUsize>,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            let counter = self.counter.clone();
            let order = self.order.clone();
            let name = self.name;

            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                order.lock().unwrap().push(name);
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        HttpRequest::builder()
            .uri("/orders")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_executes_in_order() {
        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stage = |name| OrderTrackingMiddleware {
            name,
            counter: counter.clone(),
            order: order.clone(),
        };

        let pipeline = Pipeline::builder()
            .add_stage(stage("first"))
            .add_stage(stage("second"))
            .add_stage(stage("third"))
            .build();

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Response::text(StatusCode::OK, "OK") })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let pipeline = Pipeline::builder().build();
        assert_eq!(pipeline.stage_count(), 0);

        let response = pipeline
            .process(MiddlewareContext::new(), request(), |_ctx, _req| {
                Box::pin(async { Response::text(StatusCode::OK, "handler") })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_shared_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler: Handler = Arc::new(
            move |_ctx: &mut MiddlewareContext, _req: Request| -> BoxFuture<'static, Response> {
                seen.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Response::text(StatusCode::OK, "OK") })
            },
        );

        let pipeline = Pipeline::builder().build();
        for _ in 0..3 {
            let mut ctx = MiddlewareContext::new();
            let response = pipeline.dispatch(&mut ctx, request(), &handler).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stage_ordering() {
        let stages = Stage::all();
        assert!(stages.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(stages[0].name(), "recovery");
        assert_eq!(stages[5].name(), "admin");
    }

    #[test]
    fn test_stage_gates() {
        assert!(!Stage::Recovery.is_gate());
        assert!(!Stage::ErrorHandler.is_gate());
        assert!(Stage::RateLimit.is_gate());
        assert!(Stage::Admin.is_gate());
    }
}
