//! Middleware context types.
//!
//! The [`MiddlewareContext`] is the per-request state every stage shares:
//! identifiers, the attached principal, routing facts supplied by the host,
//! and the list of taxonomy errors attached so far.
//!
//! Stages and handlers never render errors themselves. They push an
//! [`AppError`] onto the context and return [`MiddlewareContext::abort`];
//! the error handler stage renders the last attached error on the way out.

use crate::types::{Response, ResponseExt};
use http::StatusCode;
use rampart_core::{AppError, Principal};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use rampart_core::{AppError, SimplePrincipal};
/// use rampart_middleware::context::MiddlewareContext;
/// use std::sync::Arc;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_principal(Arc::new(SimplePrincipal::user(7)));
/// ctx.push_error(AppError::not_found("Gun not found"));
///
/// let response = ctx.abort();
/// assert!(ctx.is_aborted());
/// assert_eq!(response.status(), 404);
/// assert_eq!(ctx.principal().and_then(|p| p.id()), Some(7));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    /// Unique identifier for this request, logged as `trace_id`.
    request_id: Uuid,

    /// When the request started processing.
    started_at: Instant,

    /// Peer address as seen by the host.
    client_addr: Option<IpAddr>,

    /// Route pattern the router matched, e.g. `/guns/:id`.
    matched_route: Option<String>,

    /// Authenticated caller, if any.
    principal: Option<Arc<dyn Principal>>,

    /// Taxonomy errors attached in order.
    errors: Vec<AppError>,

    /// Status fixed by an earlier stage, e.g. 429 from the rate limiter.
    committed_status: Option<StatusCode>,

    /// Set once any stage short-circuits the chain.
    aborted: bool,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self::with_request_id(Uuid::now_v7())
    }

    /// Creates a context with a specific request ID.
    #[must_use]
    pub fn with_request_id(request_id: Uuid) -> Self {
        Self {
            request_id,
            started_at: Instant::now(),
            client_addr: None,
            matched_route: None,
            principal: None,
            errors: Vec::new(),
            committed_status: None,
            aborted: false,
            extensions: HashMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns when the request started processing.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns the peer address, if the host supplied one.
    #[must_use]
    pub const fn client_addr(&self) -> Option<IpAddr> {
        self.client_addr
    }

    /// Sets the peer address.
    pub fn set_client_addr(&mut self, addr: IpAddr) {
        self.client_addr = Some(addr);
    }

    /// Returns the matched route pattern, if the router supplied one.
    #[must_use]
    pub fn matched_route(&self) -> Option<&str> {
        self.matched_route.as_deref()
    }

    /// Sets the matched route pattern.
    pub fn set_matched_route(&mut self, route: impl Into<String>) {
        self.matched_route = Some(route.into());
    }

    /// Returns the matched route, falling back to `path`.
    #[must_use]
    pub fn route_or<'a>(&'a self, path: &'a str) -> &'a str {
        self.matched_route.as_deref().unwrap_or(path)
    }

    /// Returns the attached principal.
    #[must_use]
    pub fn principal(&self) -> Option<&Arc<dyn Principal>> {
        self.principal.as_ref()
    }

    /// Attaches the authenticated principal.
    pub fn set_principal(&mut self, principal: Arc<dyn Principal>) {
        self.principal = Some(principal);
    }

    /// Attaches an error.
    pub fn push_error(&mut self, error: AppError) {
        self.errors.push(error);
    }

    /// Returns every attached error, oldest first.
    #[must_use]
    pub fn errors(&self) -> &[AppError] {
        &self.errors
    }

    /// Returns the most recently attached error.
    #[must_use]
    pub fn last_error(&self) -> Option<&AppError> {
        self.errors.last()
    }

    /// Drains the attached errors.
    pub fn take_errors(&mut self) -> Vec<AppError> {
        std::mem::take(&mut self.errors)
    }

    /// Stops the chain and returns a placeholder response.
    ///
    /// The placeholder carries the committed status, else the last error's
    /// status, else 500. The error handler stage replaces it with a rendered
    /// body.
    pub fn abort(&mut self) -> Response {
        self.mark_aborted();
        let status = self
            .committed_status
            .or_else(|| self.last_error().map(AppError::status_code))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Response::empty(status)
    }

    /// Commits `status` for this request and stops the chain.
    pub fn abort_with_status(&mut self, status: StatusCode) -> Response {
        self.committed_status = Some(status);
        self.abort()
    }

    /// Marks the chain as stopped without producing a response.
    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    /// Returns `true` once the chain has been stopped.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Returns the status committed by [`abort_with_status`](Self::abort_with_status).
    #[must_use]
    pub const fn committed_status(&self) -> Option<StatusCode> {
        self.committed_status
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}
