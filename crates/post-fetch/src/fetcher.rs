//! Source loading for module ids.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use post_cache::content_hash;
use post_compiler::SourceType;
use post_compiler::specifier::is_remote;

use crate::{FetchError, HttpClient, SourceError, TooLargeError};

/// Raw module source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    /// Source text.
    pub text: String,
    /// Detected source language.
    pub source_type: SourceType,
    /// Content hash of `text`.
    pub hash: String,
}

impl Source {
    /// Wrap inline source text, hashing it.
    #[must_use]
    pub fn inline(text: String, source_type: SourceType) -> Self {
        let hash = content_hash(&text);
        Self {
            text,
            source_type,
            hash,
        }
    }
}

/// Outcome of [`Fetcher::load`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetched {
    /// Source hash equals the previously recorded hash.
    Unchanged,
    /// New or changed source.
    Changed(Source),
}

/// Loads module sources from the project tree or over HTTP.
pub struct Fetcher {
    src_dir: PathBuf,
    max_module_size: u64,
    client: Arc<dyn HttpClient>,
}

impl Fetcher {
    /// Create a fetcher for the source directory `src_dir`.
    #[must_use]
    pub fn new(src_dir: PathBuf, max_module_size: u64, client: Arc<dyn HttpClient>) -> Self {
        Self {
            src_dir,
            max_module_size,
            client,
        }
    }

    /// Load the source of module `id`, comparing against `previous_hash`.
    ///
    /// Returns [`Fetched::Unchanged`] when the content hash matches, so a
    /// development server answering with identical bytes never triggers a
    /// recompile.
    pub fn load(&self, id: &str, previous_hash: Option<&str>) -> Result<Fetched, SourceError> {
        let source = if is_remote(id) {
            self.fetch_remote(id)?
        } else {
            self.read_local(id)?
        };

        if previous_hash == Some(source.hash.as_str()) {
            tracing::debug!(module = %id, "source unchanged");
            return Ok(Fetched::Unchanged);
        }
        Ok(Fetched::Changed(source))
    }

    /// Resolve a local module id to a file on disk.
    ///
    /// Ids without a transpilable extension are probed as `<id>.<ext>` and
    /// then `<id>/index.<ext>`.
    #[must_use]
    pub fn local_path(&self, id: &str) -> Option<PathBuf> {
        let base = self.src_dir.join(id.trim_start_matches('/'));
        if SourceType::from_path(id).is_some() {
            return base.is_file().then_some(base);
        }

        SourceType::ALL
            .iter()
            .map(|ty| with_extension(&base, ty.extension()))
            .chain(
                SourceType::ALL
                    .iter()
                    .map(|ty| base.join(format!("index.{}", ty.extension()))),
            )
            .find(|candidate| candidate.is_file())
    }

    /// Module id of the file a local id resolves to.
    ///
    /// `/lib/util` becomes `/lib/util.ts` and `/lib/forms` becomes
    /// `/lib/forms/index.jsx`. `None` when nothing matches.
    #[must_use]
    pub fn canonical_id(&self, id: &str) -> Option<String> {
        let path = self.local_path(id)?;
        let relative = path.strip_prefix(&self.src_dir).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(format!("/{}", segments.join("/")))
    }

    /// Read a local module, enforcing the size limit.
    pub fn read_local(&self, id: &str) -> Result<Source, SourceError> {
        let path = self
            .local_path(id)
            .ok_or_else(|| SourceError::NotFound(id.to_owned()))?;
        let io_error = |source| SourceError::Io {
            path: path.clone(),
            source,
        };

        let size = fs::metadata(&path).map_err(io_error)?.len();
        if size > self.max_module_size {
            return Err(TooLargeError {
                path,
                size,
                limit: self.max_module_size,
            }
            .into());
        }

        let text = fs::read_to_string(&path).map_err(io_error)?;
        let source_type = path
            .to_str()
            .and_then(SourceType::from_path)
            .unwrap_or_default();
        Ok(Source::inline(text, source_type))
    }

    /// Fetch a remote module.
    pub fn fetch_remote(&self, url: &str) -> Result<Source, SourceError> {
        tracing::info!(module = %url, "fetching remote module");

        let response = self.client.get(url)?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status,
            }
            .into());
        }

        let source_type = SourceType::sniff(url, response.content_type.as_deref());
        let text = String::from_utf8(response.body).map_err(|_| FetchError::Decode {
            url: url.to_owned(),
        })?;
        Ok(Source::inline(text, source_type))
    }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}
