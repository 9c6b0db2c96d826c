//! Checkpoint management handlers.

use crate::api::ApiResponse;
use crate::api::error::ApiError;
use crate::error::Error;
use crate::server::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

/// GET /_api/sites/{username}/{id}/checkpoints — newest first, with the
/// `current` pointer.
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let checkpoints = state.checkpoints.clone();
    let metadata = tokio::task::spawn_blocking(move || {
        store.get(&username, &id)?;
        checkpoints.list(&username, &id)
    })
    .await??;

    Ok(Json(ApiResponse::ok(json!({
        "current": metadata.current,
        "checkpoints": metadata.checkpoints,
        "total": metadata.checkpoints.len(),
    }))))
}

/// GET /_api/sites/{username}/{id}/checkpoints/{checkpoint_id}
pub async fn get_checkpoint(
    State(state): State<AppState>,
    Path((username, id, checkpoint_id)): Path<(String, String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let checkpoints = state.checkpoints.clone();
    let checkpoint = tokio::task::spawn_blocking(move || {
        store.get(&username, &id)?;
        checkpoints.get(&username, &id, &checkpoint_id)
    })
    .await??;

    Ok(Json(ApiResponse::ok(
        serde_json::to_value(&checkpoint).map_err(Error::from)?,
    )))
}

/// DELETE /_api/sites/{username}/{id}/checkpoints/{checkpoint_id} —
/// refuses the currently active checkpoint.
pub async fn delete_checkpoint(
    State(state): State<AppState>,
    Path((username, id, checkpoint_id)): Path<(String, String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let checkpoints = state.checkpoints.clone();
    let (username, id, checkpoint_id) = tokio::task::spawn_blocking(move || {
        store.get(&username, &id)?;
        checkpoints.delete(&username, &id, &checkpoint_id)?;
        Ok::<_, Error>((username, id, checkpoint_id))
    })
    .await??;

    Ok(Json(ApiResponse::ok_message(
        "checkpoint deleted",
        Some(json!({
            "username": username,
            "id": id,
            "checkpoint_id": checkpoint_id,
        })),
    )))
}

/// POST /_api/sites/{username}/{id}/checkpoints/{checkpoint_id}/checkout —
/// restores the live root from the checkpoint and moves `current` to it.
pub async fn checkout_checkpoint(
    State(state): State<AppState>,
    Path((username, id, checkpoint_id)): Path<(String, String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let orchestrator = state.orchestrator.clone();
    let (username, id, checkpoint_id) = tokio::task::spawn_blocking(move || {
        orchestrator.checkout(&username, &id, &checkpoint_id)?;
        Ok::<_, Error>((username, id, checkpoint_id))
    })
    .await??;

    Ok(Json(ApiResponse::ok_message(
        "site checked out to checkpoint",
        Some(json!({
            "username": username,
            "id": id,
            "checkpoint_id": checkpoint_id,
        })),
    )))
}
