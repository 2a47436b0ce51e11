//! Graph errors.

use std::path::PathBuf;

use post_compiler::CompileError;
use post_fetch::{FetchError, SourceError, TooLargeError};

/// Error from [`ModuleGraph::compile`](crate::ModuleGraph::compile).
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Remote module unavailable.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Local source over the size limit.
    #[error(transparent)]
    TooLarge(#[from] TooLargeError),

    /// Syntax or specifier errors.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// No source for the module id.
    #[error("module not found: {0}")]
    NotFound(String),

    /// Local source unreadable.
    #[error("failed to read {}", path.display())]
    Io {
        /// File on disk.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GraphError {
    /// Oversized sources are skipped, never fatal.
    #[must_use]
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLarge(_))
    }

    /// Network failure.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}

impl From<SourceError> for GraphError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Fetch(e) => Self::Fetch(e),
            SourceError::TooLarge(e) => Self::TooLarge(e),
            SourceError::NotFound(id) => Self::NotFound(id),
            SourceError::Io { path, source } => Self::Io { path, source },
        }
    }
}
