//! HTTP server: shared context, router construction, startup and shutdown.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tf_av::{ArtifactStore, ToolRegistry};
use tf_core::config::Config;

use crate::jobs::JobRegistry;

pub mod download;
pub mod error;
pub mod openapi;
pub mod routes_jobs;
pub mod routes_transform;

/// Shared application context, passed to every handler as axum state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub artifacts: ArtifactStore,
    pub registry: Arc<JobRegistry>,
}

impl AppContext {
    /// Build the full context from configuration: discover the external
    /// tools, create the artifact store, and start the job registry.
    ///
    /// Must be called from within a tokio runtime (the registry spawns its
    /// worker pool and reaper).
    pub fn from_config(config: Config) -> tf_core::Result<Self> {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let temp_root = config
            .server
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tempoforge"));
        let artifacts = ArtifactStore::new(temp_root)?;
        let registry = JobRegistry::new(&config, artifacts.clone());

        Ok(Self {
            config: Arc::new(config),
            tools,
            artifacts,
            registry,
        })
    }
}

/// Create the Axum router with all routes.
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    // Enforced before any artifact is written; multipart reads past the cap
    // fail at the boundary.
    let max_upload = ctx.config.server.max_upload_bytes as usize;

    Router::new()
        .route("/health", get(health_check))
        .route("/api/transform", post(routes_transform::submit_transform))
        .route("/api/jobs/{id}", get(routes_jobs::job_status))
        .route(
            "/api/jobs/{id}/download",
            get(routes_jobs::download_result),
        )
        .nest("/api", openapi::openapi_routes())
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and block until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }

    let ctx = AppContext::from_config(config)?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
