//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the demo handlers
//! - Wire up middleware (request lifecycle events, timeout, tracing)
//! - Expose the Prometheus scrape endpoint
//! - Bind server to listener with graceful shutdown

use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::events::EventSource;
use crate::http::demo;
use crate::http::diagnostics::{diagnostics_middleware, DiagnosticsState};
use crate::lifecycle::Shutdown;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// HTTP server for the demo service.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a server publishing request lifecycle events on `source`.
    /// `/metrics` is served when a Prometheus handle is given.
    pub fn new(config: AppConfig, source: Arc<EventSource>, metrics: Option<PrometheusHandle>) -> Self {
        let router = Self::build_router(&config, source, metrics);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &AppConfig,
        source: Arc<EventSource>,
        metrics: Option<PrometheusHandle>,
    ) -> Router {
        let diagnostics = DiagnosticsState::new(source, demo::endpoints());

        let mut router = Router::new()
            .route(demo::STATUS_ROUTE, get(demo::status))
            .route(demo::ERROR_ROUTE, get(demo::error))
            .route(demo::EXCEPTION_ROUTE, get(demo::exception))
            .route(demo::SLI_EXCEPTION_ROUTE, get(demo::sli_exception));

        if let Some(handle) = metrics {
            router = router.route("/metrics", get(metrics_handler).with_state(handle));
        }

        // Outermost first. Timeout responses pass through the diagnostics
        // layer so timed-out requests still complete their lifecycle.
        router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(diagnostics, diagnostics_middleware))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.listener.request_timeout_secs,
                ))),
        )
    }

    /// The router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(Shutdown::wait(shutdown.subscribe()))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        handle.render(),
    )
}
