//! Ready-made pipelines wired from configuration.

use rampart_config::{ConfigError, RampartConfig};
use rampart_middleware::pipeline::{Pipeline, PipelineBuilder};
use rampart_middleware::responder::Responder;
use rampart_middleware::stages::{
    AdminRequiredMiddleware, AuthRequiredMiddleware, ErrorHandlerMiddleware, HealthThresholds,
    RateLimitMiddleware, RateLimiter, RecoveryMiddleware, WebhookMonitorMiddleware,
    WebhookStatsStore,
};
use rampart_middleware::{handlers, Handler};
use rampart_telemetry::{ErrorMetrics, Logger, TelemetryError, TelemetryGuard};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while bootstrapping the control plane.
#[derive(Debug, Error)]
pub enum RampartError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Telemetry could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Every shared component of the control plane, plus pipeline factories.
///
/// All pipelines built from one `ControlPlane` share its logger, metrics
/// registry, rate limit store and webhook stats.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    config: RampartConfig,
    logger: Arc<Logger>,
    metrics: Arc<ErrorMetrics>,
    responder: Arc<Responder>,
    limiter: RateLimiter,
    webhook_stats: Arc<WebhookStatsStore>,
}

impl ControlPlane {
    /// Validates `config`, initializes telemetry and wires the globals.
    ///
    /// Keep the returned guard alive for as long as file logging should stay
    /// open.
    pub fn init(config: &RampartConfig) -> Result<(Self, TelemetryGuard), RampartError> {
        config.validate()?;
        let guard = rampart_telemetry::init_telemetry(&config.telemetry_config())?;
        tracing::info!(
            rate_limit = config.rate_limit.enabled,
            test_mode = config.responder.test_mode,
            "Control plane initialized"
        );
        Ok((Self::from_config(config), guard))
    }

    /// Wires the process-wide logger, metrics registry and webhook stats.
    #[must_use]
    pub fn from_config(config: &RampartConfig) -> Self {
        Self::with_components(
            config,
            rampart_telemetry::logger::global(),
            rampart_telemetry::metrics::global(),
            rampart_middleware::stages::webhook::global_stats(),
        )
    }

    /// Wires explicitly supplied components.
    #[must_use]
    pub fn with_components(
        config: &RampartConfig,
        logger: Arc<Logger>,
        metrics: Arc<ErrorMetrics>,
        webhook_stats: Arc<WebhookStatsStore>,
    ) -> Self {
        let responder = Responder::new(Arc::clone(&logger))
            .with_test_mode(config.responder.test_mode)
            .with_template(config.responder.error_template.clone());

        let limiter = RateLimiter::new()
            .with_sweep_every(config.rate_limit.sweep_every)
            .with_headers(config.rate_limit.headers)
            .with_webhook_route(config.webhook.route.clone());

        Self {
            config: config.clone(),
            logger,
            metrics,
            responder: Arc::new(responder),
            limiter,
            webhook_stats,
        }
    }

    /// Returns the configuration this plane was built from.
    #[must_use]
    pub const fn config(&self) -> &RampartConfig {
        &self.config
    }

    /// Returns the structured logger.
    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Returns the error metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ErrorMetrics> {
        &self.metrics
    }

    /// Returns the responder.
    #[must_use]
    pub fn responder(&self) -> &Arc<Responder> {
        &self.responder
    }

    /// Returns the shared rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Returns the webhook stats store.
    #[must_use]
    pub fn webhook_stats(&self) -> &Arc<WebhookStatsStore> {
        &self.webhook_stats
    }

    fn base(&self) -> PipelineBuilder {
        Pipeline::builder()
            .add_stage(RecoveryMiddleware::new(Arc::clone(&self.logger)))
            .add_stage(self.error_handler())
    }

    fn error_handler(&self) -> ErrorHandlerMiddleware {
        ErrorHandlerMiddleware::new(Arc::clone(&self.responder), Arc::clone(&self.metrics))
    }

    fn with_limit(&self, builder: PipelineBuilder, stage: RateLimitMiddleware) -> PipelineBuilder {
        if self.config.rate_limit.enabled {
            builder.add_stage(stage)
        } else {
            builder
        }
    }

    /// Recovery and error handling only.
    #[must_use]
    pub fn public_pipeline(&self) -> Pipeline {
        self.base().build()
    }

    /// Public pipeline plus the authentication gate.
    #[must_use]
    pub fn authenticated_pipeline(&self) -> Pipeline {
        self.base().add_stage(AuthRequiredMiddleware).build()
    }

    /// Public pipeline plus the authentication and admin gates.
    #[must_use]
    pub fn admin_pipeline(&self) -> Pipeline {
        self.base()
            .add_stage(AuthRequiredMiddleware)
            .add_stage(AdminRequiredMiddleware)
            .build()
    }

    /// Public pipeline plus an arbitrary limit on the shared store.
    #[must_use]
    pub fn rate_limited_pipeline(&self, limit: usize, window: Duration) -> Pipeline {
        let stage = self.limiter.rate_limit(limit, window);
        self.with_limit(self.base(), stage).build()
    }

    /// Public pipeline plus the configured login limit.
    #[must_use]
    pub fn login_pipeline(&self) -> Pipeline {
        let rule = self.config.rate_limit.login;
        self.rate_limited_pipeline(rule.limit, rule.window())
    }

    /// Public pipeline plus the configured password-reset limit.
    #[must_use]
    pub fn password_reset_pipeline(&self) -> Pipeline {
        let rule = self.config.rate_limit.password_reset;
        self.rate_limited_pipeline(rule.limit, rule.window())
    }

    /// Recovery, webhook monitor, error handling and the webhook limit.
    #[must_use]
    pub fn webhook_pipeline(&self) -> Pipeline {
        let monitor =
            WebhookMonitorMiddleware::new(Arc::clone(&self.webhook_stats), Arc::clone(&self.logger))
                .with_capture_limit(self.config.webhook.capture_limit);
        let rule = self.config.rate_limit.webhook;

        let builder = Pipeline::builder()
            .add_stage(RecoveryMiddleware::new(Arc::clone(&self.logger)))
            .add_stage(monitor)
            .add_stage(self.error_handler());
        self.with_limit(builder, self.limiter.rate_limit(rule.limit, rule.window()))
            .build()
    }

    /// Terminal handler for unmatched routes.
    #[must_use]
    pub fn no_route(&self) -> Handler {
        handlers::no_route_handler(Arc::clone(&self.responder))
    }

    /// Terminal handler for unsupported methods.
    #[must_use]
    pub fn no_method(&self) -> Handler {
        handlers::no_method_handler()
    }

    /// Admin dashboard data handler.
    #[must_use]
    pub fn error_metrics(&self) -> Handler {
        handlers::error_metrics_handler(Arc::clone(&self.metrics))
    }

    /// Webhook health probe handler.
    #[must_use]
    pub fn webhook_health(&self) -> Handler {
        let thresholds = HealthThresholds {
            unhealthy_below: self.config.webhook.unhealthy_below_percent,
            stale_after: Duration::from_secs(self.config.webhook.stale_after_secs),
        };
        handlers::webhook_health_handler(Arc::clone(&self.webhook_stats), thresholds)
    }
}
