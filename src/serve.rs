//! Public static-file serving.
//!
//! Everything outside `/_api` lands here. The request's `Host` header picks
//! the site through the resolver (one pointer load); the path is then mapped
//! into the site's root with the same containment discipline as archive
//! extraction. Directory requests fall back to the site's index file and
//! missing files to a site-provided `404.html`.

use crate::constants::NOT_FOUND_PAGE;
use crate::server::AppState;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Serves a request for whatever site the `Host` header resolves to.
pub async fn serve_public(State(state): State<AppState>, req: Request) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();

    let Some(site) = state.resolver.get(&host) else {
        return unresolved_host(&state, &host).await;
    };

    let root = state.config.sites_dir.join(&site.root_dir);
    let req_path = req.uri().path().to_string();
    let rel_path = if req_path == "/" {
        PathBuf::from(&site.index)
    } else {
        match sanitize_request_path(&req_path) {
            Some(p) => p,
            None => {
                debug!(host, path = %req_path, "rejected path outside site root");
                return json_error(StatusCode::FORBIDDEN, "forbidden", "path is outside the site root");
            }
        }
    };

    let file_path = root.join(&rel_path);
    let metadata = match tokio::fs::metadata(&file_path).await {
        Ok(m) => m,
        Err(_) => return not_found(&root, &req_path).await,
    };

    if metadata.is_dir() {
        let index_path = file_path.join(&site.index);
        if tokio::fs::metadata(&index_path).await.is_ok() {
            return serve_file(&index_path, StatusCode::OK).await;
        }
        return json_error(StatusCode::FORBIDDEN, "forbidden", "directory listing is disabled");
    }

    serve_file(&file_path, StatusCode::OK).await
}

/// A host with no published site: disabled sites answer 503, unknown
/// domains 404. Disabled sites are absent from the resolver table, so the
/// distinction needs a registry read; this is the cold path.
async fn unresolved_host(state: &AppState, host: &str) -> Response {
    let domain = host.split(':').next().unwrap_or(host).to_string();
    let store = state.store.clone();
    let known_disabled = tokio::task::spawn_blocking(move || {
        store
            .load()
            .map(|sites| sites.iter().any(|s| s.domain == domain && !s.enabled))
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false);

    if known_disabled {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "site disabled",
            "this site is currently disabled",
        );
    }
    json_error(
        StatusCode::NOT_FOUND,
        "site not found",
        &format!("no site is bound to host {}", host),
    )
}

/// Missing file: serve the site's `404.html` when it has one.
async fn not_found(root: &Path, req_path: &str) -> Response {
    let fallback = root.join(NOT_FOUND_PAGE);
    if tokio::fs::metadata(&fallback).await.is_ok() {
        return serve_file(&fallback, StatusCode::NOT_FOUND).await;
    }
    json_error(
        StatusCode::NOT_FOUND,
        "file not found",
        &format!("no file at {}", req_path),
    )
}

async fn serve_file(path: &Path, status: StatusCode) -> Response {
    match tokio::fs::read(path).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string();
            (status, [(header::CONTENT_TYPE, mime)], contents).into_response()
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to read site file");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
                "failed to read file",
            )
        }
    }
}

fn json_error(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        axum::Json(json!({ "error": error, "message": message })),
    )
        .into_response()
}

/// Normalizes a request path into a root-relative path, rejecting any shape
/// that could climb out of the site root.
fn sanitize_request_path(req_path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in Path::new(req_path.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
