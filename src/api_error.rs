use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::SyncError;

/// Error type for HTTP handlers. Renders as `{"success": false, "error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0}")]
    BadRequest(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Sync(err) => match err {
                SyncError::MissingColumn(_) | SyncError::MissingCredentials(_) => {
                    StatusCode::BAD_REQUEST
                }
                SyncError::VersionNotFound(_) => StatusCode::NOT_FOUND,
                SyncError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SyncError::Other(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Sync(SyncError::Storage(err)) => {
                tracing::error!(error = ?err, "storage error");
                "internal storage error".to_string()
            }
            AppError::Sync(err) if status.is_server_error() => {
                tracing::warn!(error = %err, "upstream error");
                format!("{err:#}")
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "error": message,
        });
        (status, axum::Json(body)).into_response()
    }
}
