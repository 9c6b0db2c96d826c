//! Site CRUD and deployment handlers.

use crate::api::error::ApiError;
use crate::api::ApiResponse;
use crate::constants::MAX_ARCHIVE_SIZE;
use crate::error::Error;
use crate::server::AppState;
use crate::site::{self, Site};
use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::io::Write;
use tracing::warn;

/// GET /_api/sites — every site, enabled and disabled.
pub async fn list_sites(State(state): State<AppState>) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let sites = tokio::task::spawn_blocking(move || store.load()).await??;

    Ok(Json(ApiResponse::ok(json!({
        "sites": sites,
        "total": sites.len(),
    }))))
}

#[derive(Debug, Deserialize)]
pub struct CreateSiteRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub index: Option<String>,
}

/// POST /_api/sites — create a site and publish it.
pub async fn create_site(
    State(state): State<AppState>,
    Json(req): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), ApiError> {
    if req.id.is_empty() || req.domain.is_empty() {
        return Err(ApiError::bad_request("id and domain are required"));
    }

    let mut new_site = Site::new(req.id, req.domain, &req.username);
    if let Some(index) = req.index.filter(|i| !i.is_empty()) {
        new_site.index = index;
    }

    let resolver = state.resolver.clone();
    let sites_dir = state.config.sites_dir.clone();
    let created = tokio::task::spawn_blocking(move || {
        resolver.add(&new_site)?;
        if let Err(e) = site::initialize_site_root(&sites_dir, &new_site) {
            warn!(username = %new_site.username, id = %new_site.id, error = %e, "failed to initialize site root");
        }
        Ok::<_, Error>(new_site)
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_message(
            "site created",
            Some(serde_json::to_value(&created).map_err(Error::from)?),
        )),
    ))
}

/// GET /_api/sites/{username}/{id}
pub async fn get_site(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let found = tokio::task::spawn_blocking(move || store.get(&username, &id)).await??;
    Ok(Json(ApiResponse::ok(
        serde_json::to_value(&found).map_err(Error::from)?,
    )))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSiteRequest {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// PUT /_api/sites/{username}/{id} — id, username, and root dir are fixed.
pub async fn update_site(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
    Json(req): Json<UpdateSiteRequest>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let resolver = state.resolver.clone();
    let updated = tokio::task::spawn_blocking(move || {
        let mut site = store.get(&username, &id)?;
        if let Some(domain) = req.domain.filter(|d| !d.is_empty()) {
            site.domain = domain;
        }
        if let Some(index) = req.index.filter(|i| !i.is_empty()) {
            site.index = index;
        }
        if let Some(enabled) = req.enabled {
            site.enabled = enabled;
        }
        site.updated_at = Utc::now();
        resolver.update(&site)?;
        Ok::<_, Error>(site)
    })
    .await??;

    Ok(Json(ApiResponse::ok_message(
        "site updated",
        Some(serde_json::to_value(&updated).map_err(Error::from)?),
    )))
}

/// DELETE /_api/sites/{username}/{id} — removes the registry row, the live
/// root, and all checkpoint data.
pub async fn delete_site(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let resolver = state.resolver.clone();
    let checkpoints = state.checkpoints.clone();
    let orchestrator = state.orchestrator.clone();
    tokio::task::spawn_blocking(move || {
        resolver.remove_for_user(&username, &id)?;

        let root = orchestrator.site_root(&username, &id);
        if root.exists() {
            if let Err(e) = fs::remove_dir_all(&root) {
                warn!(%username, %id, error = %e, "failed to remove live site root");
            }
        }
        if let Err(e) = checkpoints.remove_site_data(&username, &id) {
            warn!(%username, %id, error = %e, "failed to remove checkpoint data");
        }
        Ok::<_, Error>(())
    })
    .await??;

    Ok(Json(ApiResponse::ok_message("site deleted", None)))
}

/// POST /_api/sites/{username}/{id}/deploy — multipart upload with a `file`
/// field carrying the archive.
pub async fn deploy_site(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse>, ApiError> {
    let mut upload = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::bad_request("upload field 'file' has no filename"));
        }

        // Spool to disk; archives can be far larger than we want in memory.
        let mut spool = tempfile::NamedTempFile::new()
            .map_err(|e| ApiError::internal(format!("failed to create spool file: {}", e)))?;
        let mut size = 0usize;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?
        {
            size += chunk.len();
            if size > MAX_ARCHIVE_SIZE {
                return Err(ApiError::bad_request("upload exceeds the size limit"));
            }
            spool
                .write_all(&chunk)
                .map_err(|e| ApiError::internal(format!("failed to spool upload: {}", e)))?;
        }

        upload = Some((spool, file_name));
        break;
    }

    let Some((spool, file_name)) = upload else {
        return Err(ApiError::bad_request("missing upload field 'file'"));
    };

    let orchestrator = state.orchestrator.clone();
    let (outcome, username, id) = tokio::task::spawn_blocking(move || {
        let outcome = orchestrator.deploy(&username, &id, spool.path(), &file_name)?;
        Ok::<_, Error>((outcome, username, id))
    })
    .await??;

    let mut data = json!({ "username": username, "id": id });
    if let Some(checkpoint) = outcome.checkpoint {
        data["checkpoint"] = serde_json::to_value(&checkpoint).map_err(Error::from)?;
    }

    Ok(Json(ApiResponse::ok_message("site deployed", Some(data))))
}

/// GET /_api/sites/{username}/{id}/usage — cached usage, recounting once
/// when the cache is empty.
pub async fn get_site_usage(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse>, ApiError> {
    let store = state.store.clone();
    let checkpoints = state.checkpoints.clone();
    let orchestrator = state.orchestrator.clone();

    let usage = tokio::task::spawn_blocking(move || {
        store.get(&username, &id)?;

        let mut usage = checkpoints.storage_usage(&username, &id)?;
        if usage.total_size == 0 && usage.deployed_size == 0 {
            let root = orchestrator.site_root(&username, &id);
            checkpoints.storage_recount(&username, &id, &root)?;
            usage = checkpoints.storage_usage(&username, &id)?;
        }
        Ok::<_, Error>(usage)
    })
    .await??;

    Ok(Json(ApiResponse::ok(
        serde_json::to_value(&usage).map_err(Error::from)?,
    )))
}
