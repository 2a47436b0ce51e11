//! Source loading errors.

use std::path::PathBuf;

/// Remote module could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Server answered with a non-success status.
    #[error("failed to fetch {url}: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Request failed before a status was received (DNS, TLS, timeout, body limit).
    #[error("failed to fetch {url}")]
    Transport {
        /// Requested URL.
        url: String,
        #[source]
        source: ureq::Error,
    },

    /// Response body is not UTF-8 text.
    #[error("failed to fetch {url}: response body is not valid UTF-8")]
    Decode {
        /// Requested URL.
        url: String,
    },
}

impl FetchError {
    /// Requested URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Status { url, .. } | Self::Transport { url, .. } | Self::Decode { url } => url,
        }
    }

    /// HTTP status, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Local source file exceeds the configured size limit.
#[derive(Debug, thiserror::Error)]
#[error("{} is {size} bytes, over the {limit} byte module size limit", path.display())]
pub struct TooLargeError {
    /// File on disk.
    pub path: PathBuf,
    /// Actual size in bytes.
    pub size: u64,
    /// Configured limit in bytes.
    pub limit: u64,
}

/// Error while obtaining a module's source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Remote fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Local file over the size limit.
    #[error(transparent)]
    TooLarge(#[from] TooLargeError),

    /// No local file matches the module id.
    #[error("module not found: {0}")]
    NotFound(String),

    /// Local file could not be read.
    #[error("failed to read {}", path.display())]
    Io {
        /// File on disk.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
