use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::fetch::FetchError;

/// Request failures. Every variant renders as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API key not configured on server")]
    ApiKeyNotConfigured,

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("No audio_url provided")]
    MissingAudioUrl,

    #[error("{0}")]
    BadRequest(String),

    #[error("Failed to download audio file: {0}")]
    Download(#[from] FetchError),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    InvalidTrackSelection(String),

    #[error("artifact not found")]
    NotFound,

    #[error("{0}")]
    Analysis(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ApiKeyNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MissingAudioUrl
            | ApiError::BadRequest(_)
            | ApiError::Download(_)
            | ApiError::UnsupportedFormat(_)
            | ApiError::InvalidTrackSelection(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Analysis(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<chord_analysis::Error> for ApiError {
    fn from(err: chord_analysis::Error) -> Self {
        match err {
            chord_analysis::Error::InvalidTrackSelection(_) => {
                ApiError::InvalidTrackSelection(err.to_string())
            }
            other => ApiError::Analysis(other.to_string()),
        }
    }
}

impl From<audio_features::Error> for ApiError {
    fn from(err: audio_features::Error) -> Self {
        match err {
            audio_features::Error::UnsupportedFormat(_) => ApiError::UnsupportedFormat(err.to_string()),
            audio_features::Error::Resample(_) => ApiError::Internal(err.to_string()),
            audio_features::Error::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("analysis task failed: {err}"))
    }
}
