//! Content-negotiated rendering of taxonomy errors.
//!
//! The [`Responder`] turns one [`AppError`] into one HTTP response:
//!
//! - `Accept` containing `application/json` gets an [`ErrorResponse`] body
//! - test mode gets the message as plain text
//! - everything else gets the HTML error template, or plain text if the
//!   template fails or panics
//!
//! Internal errors never show their own text. They get the generic message,
//! a fresh tracking ID in the JSON body, and an `ERROR` log entry carrying the
//! same ID.

use crate::context::MiddlewareContext;
use crate::types::{RequestParts, Response, ResponseExt};
use http::StatusCode;
use rampart_core::{generate_error_id, AppError, ErrorResponse};
use rampart_telemetry::{log_fields, Logger};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Default name of the HTML error template.
pub const ERROR_TEMPLATE: &str = "partials/error.templ";

/// Template binding holding the user-visible message.
pub const ERROR_MESSAGE_BINDING: &str = "errorMsg";

/// Errors produced by a [`TemplateRenderer`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// No template with this name is registered.
    #[error("Template not found: {0}")]
    NotFound(String),

    /// The template exists but could not be rendered.
    #[error("Failed to render template {name}: {reason}")]
    Render {
        /// Template name.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Renders named HTML templates.
pub trait TemplateRenderer: Send + Sync + 'static {
    /// Renders `name` with `data` bound.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the template is unknown or fails.
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError>;
}

/// Minimal built-in renderer for the error template.
///
/// Produces an escaped fragment for [`ERROR_TEMPLATE`] and rejects every
/// other name. Hosts with real page templates should plug their own engine
/// (e.g. `tera`) in through [`Responder::with_renderer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinErrorTemplate;

impl TemplateRenderer for BuiltinErrorTemplate {
    fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
        if name != ERROR_TEMPLATE {
            return Err(RenderError::NotFound(name.to_string()));
        }

        let message = data
            .get(ERROR_MESSAGE_BINDING)
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::Render {
                name: name.to_string(),
                reason: format!("missing binding {ERROR_MESSAGE_BINDING}"),
            })?;

        Ok(format!(
            "<div class=\"alert alert-danger\" role=\"alert\">{}</div>",
            escape_html(message)
        ))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders taxonomy errors into responses.
#[derive(Clone)]
pub struct Responder {
    logger: Arc<Logger>,
    renderer: Arc<dyn TemplateRenderer>,
    test_mode: bool,
    template: String,
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("test_mode", &self.test_mode)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl Responder {
    /// Creates a responder logging to `logger` with the built-in template.
    #[must_use]
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            renderer: Arc::new(BuiltinErrorTemplate),
            test_mode: false,
            template: ERROR_TEMPLATE.to_string(),
        }
    }

    /// Creates a responder logging to the global logger.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(rampart_telemetry::logger::global())
    }

    /// Replaces the template renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl TemplateRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// Enables or disables test mode, which skips HTML entirely.
    #[must_use]
    pub const fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Sets the HTML template name.
    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = name.into();
        self
    }

    /// Returns the logger this responder writes to.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Returns whether test mode is enabled.
    #[must_use]
    pub const fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Renders `error` at its own status.
    #[must_use]
    pub fn respond(&self, ctx: &MiddlewareContext, parts: &RequestParts, error: &AppError) -> Response {
        self.respond_with_status(ctx, parts, error, None)
    }

    /// Renders `error`, letting `status` override the taxonomy status.
    ///
    /// The override appears both on the wire and in the JSON `code`.
    #[must_use]
    pub fn respond_with_status(
        &self,
        ctx: &MiddlewareContext,
        parts: &RequestParts,
        error: &AppError,
        status: Option<StatusCode>,
    ) -> Response {
        let status = status.unwrap_or_else(|| error.status_code());
        let message = error.message();

        let tracking_id = match error {
            AppError::Validation { .. }
            | AppError::Auth { .. }
            | AppError::NotFound { .. }
            | AppError::Payment { .. } => None,
            AppError::Internal(source) => {
                let id = generate_error_id();
                self.logger.error(
                    "Internal server error",
                    Some(source),
                    log_fields! {
                        "error_id" => id,
                        "path" => parts.path(),
                        "trace_id" => ctx.request_id().to_string(),
                    },
                );
                Some(id)
            }
        };

        if parts.accepts_json() {
            let mut body = ErrorResponse::new(status.as_u16(), message);
            body.id = tracking_id;
            return Response::json(status, &body);
        }

        if self.test_mode {
            return Response::text(status, message);
        }

        self.render_html(status, message)
    }

    fn render_html(&self, status: StatusCode, message: &str) -> Response {
        let data = json!({ ERROR_MESSAGE_BINDING: message });
        let rendered = catch_unwind(AssertUnwindSafe(|| {
            self.renderer.render(&self.template, &data)
        }));

        match rendered {
            Ok(Ok(html)) => Response::html(status, html),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, template = %self.template, "Error template failed");
                Response::text(status, message)
            }
            Err(_) => {
                tracing::error!(template = %self.template, "Error template panicked");
                Response::text(status, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{body_bytes, Request, HTML_CONTENT_TYPE, TEXT_CONTENT_TYPE};
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use http_body_util::Full;
    use rampart_telemetry::{LogLevel, MemoryWriter};

    fn parts(accept: Option<&str>) -> RequestParts {
        let mut builder = http::Request::builder().uri("/checkout");
        if let Some(accept) = accept {
            builder = builder.header("accept", accept);
        }
        let request: Request = builder.body(Full::new(Bytes::new())).unwrap();
        RequestParts::from_request(&request)
    }

    fn responder() -> (Responder, MemoryWriter) {
        let (logger, writer) = Logger::in_memory();
        (Responder::new(Arc::new(logger)), writer)
    }

    async fn body_string(response: Response) -> String {
        String::from_utf8(body_bytes(response.into_body()).await.to_vec()).unwrap()
    }

    struct PanickingRenderer;

    impl TemplateRenderer for PanickingRenderer {
        fn render(&self, _name: &str, _data: &Value) -> Result<String, RenderError> {
            panic!("template exploded")
        }
    }

    struct PageRenderer;

    impl TemplateRenderer for PageRenderer {
        fn render(&self, name: &str, data: &Value) -> Result<String, RenderError> {
            Ok(format!("<main data-template=\"{name}\">{}</main>", data[ERROR_MESSAGE_BINDING]))
        }
    }

    #[tokio::test]
    async fn test_host_renderer_replaces_builtin() {
        let (responder, _) = responder();
        let responder = responder
            .with_renderer(PageRenderer)
            .with_template("errors/page.html");
        let ctx = MiddlewareContext::new();

        let response = responder.respond(&ctx, &parts(Some("text/html")), &AppError::not_found("Gun not found"));
        assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);
        assert_eq!(
            body_string(response).await,
            r#"<main data-template="errors/page.html">"Gun not found"</main>"#
        );
    }

    #[tokio::test]
    async fn test_payment_error_as_json() {
        let (responder, _) = responder();
        let ctx = MiddlewareContext::new();
        let error = AppError::payment("Payment failed", "CARD_DECLINED");

        let response = responder.respond(&ctx, &parts(Some("application/json")), &error);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        assert_eq!(
            body_string(response).await,
            r#"{"code":400,"message":"Payment failed"}"#
        );
    }

    #[tokio::test]
    async fn test_internal_error_gets_tracking_id() {
        let (responder, writer) = responder();
        let ctx = MiddlewareContext::new();
        let error = AppError::internal_msg("boom");

        let response = responder.respond(&ctx, &parts(Some("application/json")), &error);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: ErrorResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.code, 500);
        assert_eq!(body.message, "An internal error occurred");
        let id = body.id.unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let entries = writer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[0].message, "Internal server error");
        assert_eq!(entries[0].error.as_deref(), Some("boom"));
        assert_eq!(entries[0].path.as_deref(), Some("/checkout"));
        assert_eq!(entries[0].fields["error_id"], id);
    }

    #[tokio::test]
    async fn test_taxonomy_errors_are_not_logged() {
        let (responder, writer) = responder();
        let ctx = MiddlewareContext::new();

        let _ = responder.respond(&ctx, &parts(None), &AppError::not_found("Gun not found"));
        assert!(writer.entries().is_empty());
    }

    #[tokio::test]
    async fn test_committed_status_wins() {
        let (responder, _) = responder();
        let ctx = MiddlewareContext::new();
        let error = AppError::validation("Rate limit exceeded. Try again in 1m0s");

        let response = responder.respond_with_status(
            &ctx,
            &parts(Some("application/json")),
            &error,
            Some(StatusCode::TOO_MANY_REQUESTS),
        );
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: ErrorResponse = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.code, 429);
        assert_eq!(body.message, "Rate limit exceeded. Try again in 1m0s");
    }

    #[tokio::test]
    async fn test_html_by_default() {
        let (responder, _) = responder();
        let ctx = MiddlewareContext::new();

        let response = responder.respond(&ctx, &parts(Some("text/html")), &AppError::auth("<b>nope</b>"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);
        let body = body_string(response).await;
        assert!(body.contains("&lt;b&gt;nope&lt;/b&gt;"));
    }

    #[tokio::test]
    async fn test_test_mode_is_plain_text() {
        let (responder, _) = responder();
        let responder = responder.with_test_mode(true);
        let ctx = MiddlewareContext::new();

        let response = responder.respond(&ctx, &parts(None), &AppError::validation("Invalid input"));
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_CONTENT_TYPE);
        assert_eq!(body_string(response).await, "Invalid input");
    }

    #[tokio::test]
    async fn test_panicking_template_falls_back_to_text() {
        let (responder, _) = responder();
        let responder = responder.with_renderer(PanickingRenderer);
        let ctx = MiddlewareContext::new();

        let response = responder.respond(&ctx, &parts(None), &AppError::not_found("Page not found"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_CONTENT_TYPE);
        assert_eq!(body_string(response).await, "Page not found");
    }

    #[tokio::test]
    async fn test_unknown_template_falls_back_to_text() {
        let (responder, _) = responder();
        let responder = responder.with_template("partials/missing.templ");
        let ctx = MiddlewareContext::new();

        let response = responder.respond(&ctx, &parts(None), &AppError::not_found("Page not found"));
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_CONTENT_TYPE);
    }

    #[test]
    fn test_builtin_template_requires_binding() {
        let err = BuiltinErrorTemplate
            .render(ERROR_TEMPLATE, &json!({}))
            .unwrap_err();
        assert!(matches!(err, RenderError::Render { .. }));
    }
}
