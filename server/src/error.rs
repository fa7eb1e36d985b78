//! Error kinds and their canonical HTTP status mapping. Every handler
//! returns `Result<_, AppError>`; axum's `IntoResponse` impl below turns
//! that into the `{error: string}` JSON body the HTTP surface promises.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TargetExists(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    ArchiveCorrupt(String),

    #[error("{0}")]
    ReadFailed(String),

    #[error("{0}")]
    Internal(String),

    #[error("cancelled")]
    Cancelled,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TargetExists(_) => StatusCode::BAD_REQUEST,
            AppError::Unsupported(_) => StatusCode::BAD_REQUEST,
            AppError::ArchiveCorrupt(_)
            | AppError::ReadFailed(_)
            | AppError::Internal(_)
            | AppError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<manga_archive::ArchiveError> for AppError {
    fn from(e: manga_archive::ArchiveError) -> Self {
        match e {
            manga_archive::ArchiveError::NotFound(m) => AppError::NotFound(m),
            manga_archive::ArchiveError::Unsupported(m) => AppError::Unsupported(m),
            manga_archive::ArchiveError::ArchiveCorrupt(m) => AppError::ArchiveCorrupt(m),
            manga_archive::ArchiveError::EntryNotFound(i) => {
                AppError::NotFound(format!("page index {i} out of range"))
            }
            manga_archive::ArchiveError::ReadFailed(m) => AppError::ReadFailed(m),
            manga_archive::ArchiveError::Io(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}
