//! API server: policy query routes, operational probes, Swagger UI and the
//! Prometheus exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::routing::{get, post};
use axum::Router;
use campaign_core::config::AppConfig;
use campaign_reporting::AudienceReportBuilder;
use campaign_rl_engine::PolicyEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the HTTP router over `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Policy queries
        .route("/get-next-action", post(rest::get_next_action))
        .route("/campaign-audience", get(rest::campaign_audience))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<PolicyEngine>,
    reports: Arc<AudienceReportBuilder>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<PolicyEngine>) -> Self {
        let reports = Arc::new(AudienceReportBuilder::new(config.labels.clone()));
        Self {
            config,
            engine,
            reports,
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            reports: self.reports.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };
        let app = build_router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
