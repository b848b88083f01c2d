//! Per-request scratch directory for a single compile.
//!
//! Removal is tied to `Drop`, so the directory goes away on every exit path:
//! success, compiler failure, timeout, I/O error or a panic unwinding through
//! the request.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::compile::error::LatexError;

pub const SOURCE_FILE: &str = "document.tex";
pub const ARTIFACT_FILE: &str = "document.pdf";

const WORKSPACE_PREFIX: &str = "latex-";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a uniquely named directory under `parent`.
    pub async fn create(parent: &Path) -> Result<Self, LatexError> {
        let parent = parent.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(parent)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|created| created)
        .map_err(|e| LatexError::io("Failed to create temp dir", e))?;

        debug!("Workspace created: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.path().join(SOURCE_FILE)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.path().join(ARTIFACT_FILE)
    }

    /// Writes the document exactly as received. No trimming, no re-encoding.
    pub async fn write_source(&self, source: &str) -> Result<PathBuf, LatexError> {
        let path = self.source_path();
        tokio::fs::write(&path, source)
            .await
            .map_err(|e| LatexError::io("Failed to write .tex file", e))?;
        Ok(path)
    }

    pub async fn read_artifact(&self) -> Result<Vec<u8>, LatexError> {
        tokio::fs::read(self.artifact_path())
            .await
            .map_err(|source| LatexError::ArtifactMissing { source })
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        debug!("Releasing workspace: {}", self.dir.path().display());
    }
}
