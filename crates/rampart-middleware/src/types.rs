//! Common types used throughout the middleware pipeline.
//!
//! This module defines the HTTP request and response types used by middleware
//! and a few response constructors that never panic.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use serde::Serialize;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Content type for JSON bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type for plain-text bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type for HTML bodies.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates a plain-text response.
    fn text(status: StatusCode, message: &str) -> Response;

    /// Creates a JSON response, or a bare 500 if `body` cannot be serialized.
    fn json<T: Serialize>(status: StatusCode, body: &T) -> Response;

    /// Creates an HTML response.
    fn html(status: StatusCode, body: String) -> Response;

    /// Creates an empty response with the given status.
    fn empty(status: StatusCode) -> Response;
}

impl ResponseExt for Response {
    fn text(status: StatusCode, message: &str) -> Response {
        with_body(status, TEXT_CONTENT_TYPE, Bytes::from(message.to_string()))
    }

    fn json<T: Serialize>(status: StatusCode, body: &T) -> Response {
        match serde_json::to_vec(body) {
            Ok(bytes) => with_body(status, JSON_CONTENT_TYPE, Bytes::from(bytes)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                Self::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn html(status: StatusCode, body: String) -> Response {
        with_body(status, HTML_CONTENT_TYPE, Bytes::from(body))
    }

    fn empty(status: StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Reads the whole body of a response.
pub async fn body_bytes(body: Full<Bytes>) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    }
}

/// The parts of a request the error path needs after the request itself has
/// been handed downstream.
#[derive(Debug, Clone)]
pub struct RequestParts {
    /// Request method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
}

impl RequestParts {
    /// Copies method, URI and headers from a request.
    #[must_use]
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns a header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` if the `Accept` header asks for JSON.
    #[must_use]
    pub fn accepts_json(&self) -> bool {
        self.header(http::header::ACCEPT.as_str())
            .is_some_and(|accept| accept.contains("application/json"))
    }
}
