pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::compile::handlers::handle_compile;
use crate::state::AppState;
use crate::templates::handlers::{handle_get_template, handle_list_templates};

/// Upper bound on request bodies; LaTeX sources are sent inline as JSON.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let router = Router::new()
        .route("/health", get(health::health_handler))
        // Compile API. `/compile` is the path the browser editor posts to.
        .route("/compile", post(handle_compile))
        .route("/api/v1/compile", post(handle_compile))
        // Templates API
        .route("/api/v1/templates", get(handle_list_templates))
        .route("/api/v1/templates/:name", get(handle_get_template))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    // Editor bundle (index.html, script.js, ...) when configured
    match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    }
}
