//! Axum route handler for the compile endpoint.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::compile::LatexError;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub latex: String,
}

/// POST /compile
///
/// Returns the PDF as `application/pdf`, or `{ "error": "..." }` with 400/500.
/// A body that is not JSON, or lacks a string `latex` field, counts as
/// invalid input rather than a framework-level rejection.
pub async fn handle_compile(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        debug!("Rejected compile body: {rejection}");
        LatexError::Validation
    })?;

    let span = info_span!("compile", request_id = %Uuid::new_v4());
    let artifact = state
        .compiler
        .compile(&request.latex)
        .instrument(span)
        .await?;

    debug!("Sending PDF, size: {}", artifact.len());
    let disposition = format!(
        "inline; filename=\"document-{}.pdf\"",
        Utc::now().format("%Y%m%d-%H%M%S")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}
