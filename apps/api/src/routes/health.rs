use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status plus whether the LaTeX compiler is usable.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let available = state.compiler.is_available().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "latex-api",
        "compiler": {
            "path": state.config.pdflatex_path.display().to_string(),
            "available": available,
        }
    }))
}
