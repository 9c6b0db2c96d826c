//! Admin API error mapping.
//!
//! Centralizes the translation from core error kinds to HTTP status codes
//! so every handler surfaces failures with the same JSON envelope.

use crate::api::ApiResponse;
use crate::error::Error;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// An admin API failure: status code plus envelope message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse {
                success: false,
                message: Some(self.message),
                data: None,
            }),
        )
            .into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            match &err {
                Error::SiteIdExists { .. }
                | Error::DomainTaken { .. }
                | Error::CurrentCheckpointUndeletable { .. } => StatusCode::CONFLICT,

                Error::SiteNotFound { .. } | Error::CheckpointMissing { .. } => {
                    StatusCode::NOT_FOUND
                }

                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "admin API internal error");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Failures crossing a `spawn_blocking` boundary.
impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "blocking task failed");
        Self::internal("internal task failure")
    }
}
