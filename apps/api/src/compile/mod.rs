//! Compile orchestration: LaTeX source in, PDF bytes (or a typed error) out.
//!
//! The work is delegated to an external `pdflatex` binary. This module only
//! owns the request lifecycle around it: validation, the scratch workspace,
//! the bounded subprocess run and artifact pickup.
//!
//! `AppState` holds an `Arc<dyn DocumentCompiler>`; `PdfLatexCompiler` is the
//! production backend.

use async_trait::async_trait;
use bytes::Bytes;

pub mod error;
pub mod handlers;
pub mod pdflatex;
pub mod workspace;

pub use error::LatexError;
pub use pdflatex::PdfLatexCompiler;

/// Bytes of a successfully compiled PDF.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A backend that turns document source into a PDF.
///
/// Implementations must be safe to call concurrently and must not share
/// scratch state between calls.
#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    async fn compile(&self, source: &str) -> Result<Artifact, LatexError>;

    /// Whether the backend can currently run at all (binary present, etc).
    async fn is_available(&self) -> bool;
}

/// Rejects input that has nothing to compile.
pub fn validate_source(source: &str) -> Result<(), LatexError> {
    if source.trim().is_empty() {
        return Err(LatexError::Validation);
    }
    Ok(())
}
