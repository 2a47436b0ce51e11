//! Project errors.

use std::path::PathBuf;

use post_config::ConfigError;
use post_graph::GraphError;

use crate::RenderError;

/// Error from [`Project`](crate::Project) operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// Configuration or import map could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required module failed to compile.
    #[error("failed to compile {id}")]
    Graph {
        /// Module id.
        id: String,
        #[source]
        source: GraphError,
    },

    /// File system error.
    #[error("I/O error at {}", path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Renderer or executor failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Manifest serialization failed.
    #[error("failed to serialize manifest")]
    Json(#[from] serde_json::Error),
}

impl ProjectError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
