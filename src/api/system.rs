//! System handlers: registry reload and health.

use crate::api::ApiResponse;
use crate::api::error::ApiError;
use crate::error::Error;
use crate::server::AppState;
use crate::site::{self, Site};
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::json;
use tracing::warn;

/// POST /_api/reload — rebuilds the resolver from the registry and re-runs
/// site root initialization for every published site.
pub async fn reload(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let resolver = state.resolver.clone();
    let sites_dir = state.config.sites_dir.clone();
    let count = tokio::task::spawn_blocking(move || {
        resolver.load()?;

        for snapshot in resolver.list() {
            let mut placeholder = Site::new(
                snapshot.id.clone(),
                snapshot.domain.clone(),
                &snapshot.username,
            );
            placeholder.index = snapshot.index.clone();
            if let Err(e) = site::initialize_site_root(&sites_dir, &placeholder) {
                warn!(domain = %snapshot.domain, error = %e, "failed to initialize site root on reload");
            }
        }

        Ok::<_, Error>(resolver.count())
    })
    .await??;

    Ok(Json(ApiResponse::ok_message(
        format!("reload complete, {} sites published", count),
        Some(json!({
            "sites_count": count,
            "reloaded_at": Utc::now(),
        })),
    )))
}

/// GET /_api/health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({
        "status": "healthy",
        "sites_count": state.resolver.count(),
        "timestamp": Utc::now(),
    })))
}
