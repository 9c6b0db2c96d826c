//! HTTP application wiring.
//!
//! Builds the axum router, shares component handles with handlers, and runs
//! the server with graceful shutdown. Everything under `/_api` is the
//! Basic-Auth-gated admin surface; every other request is Host-routed
//! static serving.

use crate::api;
use crate::checkpoint::CheckpointManager;
use crate::config::ServerConfig;
use crate::constants::ADMIN_API_PREFIX;
use crate::deploy::DeploymentOrchestrator;
use crate::error::{Error, Result};
use crate::resolver::SiteResolver;
use crate::serve;
use crate::store::SiteStore;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<SiteStore>,
    pub resolver: Arc<SiteResolver>,
    pub checkpoints: Arc<CheckpointManager>,
    pub orchestrator: Arc<DeploymentOrchestrator>,
}

impl AppState {
    /// Instantiates every component over the configured directories. No
    /// process-wide singletons; handlers receive this state explicitly.
    pub fn new(config: ServerConfig, checkpoints_dir: std::path::PathBuf) -> Self {
        let store = Arc::new(SiteStore::new(&config.data_dir));
        let resolver = Arc::new(SiteResolver::new(store.clone()));
        let checkpoints = Arc::new(CheckpointManager::new(checkpoints_dir));
        let orchestrator = Arc::new(DeploymentOrchestrator::new(
            store.clone(),
            checkpoints.clone(),
            config.sites_dir.clone(),
        ));
        Self {
            config: Arc::new(config),
            store,
            resolver,
            checkpoints,
            orchestrator,
        }
    }
}

/// Composes the full router: admin API nested under `/_api`, public static
/// serving for everything else.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest(ADMIN_API_PREFIX, api::admin_router(state.clone()))
        .fallback(serve::serve_public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured port and serves until SIGINT/SIGTERM, then drains
/// in-flight requests.
pub async fn run(state: AppState) -> Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config {
            reason: format!("failed to bind {}: {}", addr, e),
        })?;

    info!(%addr, "server listening");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Config {
            reason: format!("server error: {}", e),
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
}
