//! HTTP surface for the print slicing service: request validation, admission,
//! and wire-format translation live here; [`slicer_core::SlicerCore`] owns
//! everything that actually touches the filesystem or a subprocess.

pub mod auth;
pub mod errors;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use slicer_config::SlicerConfig;
use slicer_core::SlicerCore;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct HttpService {
    state: AppState,
    config: SlicerConfig,
}

impl HttpService {
    pub async fn new(config: SlicerConfig) -> anyhow::Result<Self> {
        let core = SlicerCore::bootstrap(config.clone()).await?;
        Ok(Self {
            state: AppState::new(core),
            config,
        })
    }

    /// Build the router: slicing, pricing, download and health endpoints,
    /// wrapped in CORS, request tracing, and an upload body size cap.
    pub fn create_router(&self) -> Router {
        let cors = build_cors_layer(&self.config);

        Router::new()
            .route("/slice/:tech", post(routes::slice::slice))
            .route("/pricing", get(routes::pricing::get_all))
            .route("/pricing/:tech", post(routes::pricing::create))
            .route(
                "/pricing/:tech/:material",
                patch(routes::pricing::update).delete(routes::pricing::delete),
            )
            .route("/download/:name", get(routes::download::download))
            .route("/health", get(routes::health::health))
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(
                self.config.max_upload_bytes as usize,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    pub async fn serve(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = self.create_router();
        info!(%addr, "starting print slicing HTTP service");

        let listener = TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

fn build_cors_layer(config: &SlicerConfig) -> CorsLayer {
    let origins = &config.service.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| axum::http::HeaderValue::from_str(o).ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    let methods: Vec<_> = config
        .service
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<_> = config
        .service
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(3600))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
}

/// Start the HTTP service: build it from `config`, bind, and serve until a
/// shutdown signal arrives.
pub async fn start_service(config: SlicerConfig) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.service.bind_address.parse()?, config.service.port);
    let service = HttpService::new(config).await?;
    service.serve(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use tempfile::tempdir;

    async fn test_service() -> (HttpService, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut config = SlicerConfig::default();
        config.paths.pricing_file_path = dir
            .path()
            .join("pricing.json")
            .to_string_lossy()
            .to_string();
        config.paths.error_log_path = dir.path().join("log.json").to_string_lossy().to_string();
        config.paths.scratch_dir = dir.path().join("scratch").to_string_lossy().to_string();
        config.paths.output_dir = dir.path().join("output").to_string_lossy().to_string();

        let service = HttpService::new(config).await.unwrap();
        (service, dir)
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let (service, _dir) = test_service().await;
        let server = TestServer::new(service.create_router()).unwrap();

        let response = server.get("/health").await;
        assert!(response.status_code().is_success());

        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn pricing_list_is_public() {
        let (service, _dir) = test_service().await;
        let server = TestServer::new(service.create_router()).unwrap();

        let response = server.get("/pricing").await;
        assert!(response.status_code().is_success());

        let body: serde_json::Value = response.json();
        assert!(body["FDM"]["PLA"].is_number());
    }

    #[tokio::test]
    async fn pricing_mutation_without_key_is_service_unavailable() {
        let (service, _dir) = test_service().await;
        let server = TestServer::new(service.create_router()).unwrap();

        let response = server
            .post("/pricing/FDM")
            .json(&serde_json::json!({"material": "ASA", "price": 1200}))
            .await;
        assert_eq!(response.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn nonexistent_route_is_not_found() {
        let (service, _dir) = test_service().await;
        let server = TestServer::new(service.create_router()).unwrap();

        let response = server.get("/nope").await;
        assert_eq!(response.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
