use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Everything that can end a compile request.
///
/// Variants are kept distinct so the HTTP layer can pick a status code and the
/// editor can show a specific message. Display strings are user-facing.
#[derive(Debug, Error)]
pub enum LatexError {
    /// Empty, whitespace-only or malformed input. No workspace was created.
    #[error("No valid LaTeX code provided")]
    Validation,

    #[error("pdflatex binary missing or not executable at {}", path.display())]
    DependencyMissing { path: PathBuf },

    /// Workspace filesystem failure. `context` is what gets shown to the caller.
    #[error("{context}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Compilation timed out after {budget:?}")]
    Timeout { budget: Duration },

    /// The compiler ran and rejected the document. Diagnostics are verbatim.
    #[error("{diagnostics}")]
    Compilation { diagnostics: String },

    /// The compiler exited cleanly but left no readable PDF behind.
    #[error("Failed to read PDF")]
    ArtifactMissing {
        #[source]
        source: std::io::Error,
    },
}

impl LatexError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        LatexError::Io { context, source }
    }

    /// Compiler rejections and timeouts are attributed to the document;
    /// everything else is an infrastructure fault.
    pub fn status_code(&self) -> StatusCode {
        match self {
            LatexError::Validation
            | LatexError::Timeout { .. }
            | LatexError::Compilation { .. } => StatusCode::BAD_REQUEST,
            LatexError::DependencyMissing { .. }
            | LatexError::Io { .. }
            | LatexError::ArtifactMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable tag used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            LatexError::Validation => "VALIDATION_ERROR",
            LatexError::DependencyMissing { .. } => "DEPENDENCY_MISSING",
            LatexError::Io { .. } => "IO_ERROR",
            LatexError::Timeout { .. } => "TIMEOUT",
            LatexError::Compilation { .. } => "COMPILE_ERROR",
            LatexError::ArtifactMissing { .. } => "ARTIFACT_MISSING",
        }
    }
}
