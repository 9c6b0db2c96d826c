//! Admin HTTP API.
//!
//! Mounted under `/_api` and gated by HTTP Basic Auth with the single
//! configured credential. All responses use the envelope
//! `{success, message?, data?}`.

pub mod checkpoints;
pub mod error;
pub mod sites;
pub mod system;

use crate::constants::MAX_ARCHIVE_SIZE;
use crate::server::AppState;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

/// Response envelope shared by every admin endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_message(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Builds the admin router.
pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/sites", get(sites::list_sites).post(sites::create_site))
        .route(
            "/sites/{username}/{id}",
            get(sites::get_site)
                .put(sites::update_site)
                .delete(sites::delete_site),
        )
        .route("/sites/{username}/{id}/deploy", post(sites::deploy_site))
        .route("/sites/{username}/{id}/usage", get(sites::get_site_usage))
        .route(
            "/sites/{username}/{id}/checkpoints",
            get(checkpoints::list_checkpoints),
        )
        .route(
            "/sites/{username}/{id}/checkpoints/{checkpoint_id}",
            get(checkpoints::get_checkpoint).delete(checkpoints::delete_checkpoint),
        )
        .route(
            "/sites/{username}/{id}/checkpoints/{checkpoint_id}/checkout",
            post(checkpoints::checkout_checkpoint),
        )
        .route("/reload", post(system::reload))
        .route("/health", get(system::health))
        .layer(middleware::from_fn_with_state(state, require_basic_auth))
        .layer(DefaultBodyLimit::max(MAX_ARCHIVE_SIZE))
}

/// Basic Auth gate for the admin surface.
async fn require_basic_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|creds| {
            creds
                .split_once(':')
                .map(|(user, pass)| user == state.config.admin_user && pass == state.config.admin_pass)
        })
        .unwrap_or(false);

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"pagehost admin\"")],
            axum::Json(ApiResponse {
                success: false,
                message: Some("authentication required".to_string()),
                data: None,
            }),
        )
            .into_response();
    }

    next.run(req).await
}
