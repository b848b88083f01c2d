use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::compile::LatexError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// The body is always `{ "error": "<message>" }`; the editor shows the message
/// as-is, so compiler diagnostics pass through un-summarized.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Latex(#[from] LatexError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Latex(e) => e.status_code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            AppError::NotFound(msg) => msg.clone(),
            AppError::Latex(e) => {
                if status.is_server_error() {
                    tracing::error!("Compile infrastructure error [{}]: {e:?}", e.code());
                } else {
                    tracing::info!("Compile rejected [{}]", e.code());
                }
                e.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
