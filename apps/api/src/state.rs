use std::sync::Arc;

use crate::compile::DocumentCompiler;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Compile backend. Default: `PdfLatexCompiler` at `config.pdflatex_path`.
    pub compiler: Arc<dyn DocumentCompiler>,
}
