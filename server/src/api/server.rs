//! API server initialization

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::openapi::{openapi_json, swagger_ui_html};
use super::routes;
use crate::core::CoreApp;
use crate::core::constants::OTLP_BODY_LIMIT;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Build the full HTTP router
    fn router(app: &CoreApp) -> Router {
        // Gzip bodies are inflated first; the limit applies to the inflated size
        let otlp_routes = routes::otlp_routes(app.pipeline.clone())
            .layer(DefaultBodyLimit::max(OTLP_BODY_LIMIT))
            .layer(RequestDecompressionLayer::new());

        let query_routes = routes::query_routes(app.pool.clone()).layer(CompressionLayer::new());

        Router::new()
            .route("/api/openapi.json", get(openapi_json))
            .route("/api/docs", get(swagger_ui_html))
            .merge(otlp_routes)
            .merge(query_routes)
            .fallback(middleware::handle_404)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until shutdown is triggered; returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;
        let shutdown = app.shutdown.clone();

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let router = Self::router(&app);

        let listener = TcpListener::bind(addr).await?;
        tracing::debug!(%addr, "HTTP server listening");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        Ok(app)
    }
}
