use axum::{extract::Path, Json};

use crate::errors::AppError;
use crate::templates::{get_template, list_templates, Template, TemplateInfo};

/// GET /api/v1/templates
pub async fn handle_list_templates() -> Json<Vec<TemplateInfo>> {
    Json(list_templates())
}

/// GET /api/v1/templates/:name
pub async fn handle_get_template(
    Path(name): Path<String>,
) -> Result<Json<&'static Template>, AppError> {
    get_template(&name)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Template '{name}' not found")))
}
