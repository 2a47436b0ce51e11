//! Import specifier rewriting.
//!
//! [`PathRewriter`] turns every import specifier of one module into the
//! specifier its compiled output should use, recording each dependency edge
//! along the way.

use post_config::ImportMap;

use crate::SourceType;
use crate::specifier::{
    is_relative, is_remote, join_remote, module_stem, normalize_local, normalize_remote,
    relative_specifier, resolve_local,
};

/// Result of rewriting one specifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// Emit this specifier as-is; no dependency is recorded.
    Passthrough(String),
    /// Point at the compiled output of a recorded dependency.
    Dependency {
        /// Index into [`PathRewriter::deps`].
        index: usize,
        /// Relative output path without the `.js` suffix.
        path: String,
        /// Whether a hash prefix must be embedded before `.js`.
        hashed: bool,
    },
}

/// Specifier rewrite failure.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    /// Bare specifier with no import map entry.
    #[error("cannot resolve bare specifier \"{0}\" (add it to the import map)")]
    Bare(String),
    /// Specifier that should be a URL but does not parse as one.
    #[error("invalid URL \"{specifier}\": {source}")]
    InvalidUrl {
        specifier: String,
        #[source]
        source: url::ParseError,
    },
}

/// Maps a local id without extension to the id of the file it names.
pub type LocalResolver<'m> = &'m dyn Fn(&str) -> Option<String>;

/// Rewrites the import specifiers of a single module.
pub struct PathRewriter<'m> {
    importer: String,
    importer_stem: String,
    importer_remote: bool,
    import_map: &'m ImportMap,
    cache_deps: bool,
    resolve: Option<LocalResolver<'m>>,
    deps: Vec<String>,
}

impl<'m> PathRewriter<'m> {
    /// Create a rewriter for the module `importer` (a module id).
    #[must_use]
    pub fn new(importer: &str, import_map: &'m ImportMap, cache_deps: bool) -> Self {
        Self {
            importer: importer.to_owned(),
            importer_stem: module_stem(importer),
            importer_remote: is_remote(importer),
            import_map,
            cache_deps,
            resolve: None,
            deps: Vec::new(),
        }
    }

    /// Resolve extensionless local imports (`./util`) with `resolve`, so the
    /// recorded id names the file (`/pages/util.ts`). Unresolved ids are
    /// recorded as written.
    #[must_use]
    pub fn with_resolver(mut self, resolve: LocalResolver<'m>) -> Self {
        self.resolve = Some(resolve);
        self
    }

    /// Module ids of the recorded dependencies, in first-occurrence order.
    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    /// Rewrite one specifier as it appears in the importer's source.
    pub fn rewrite(&mut self, specifier: &str) -> Result<Rewrite, RewriteError> {
        let mapped = self.import_map.resolve(specifier);
        let target = mapped.as_deref().unwrap_or(specifier);

        if is_remote(target) {
            let url = normalize_remote(target).map_err(|source| RewriteError::InvalidUrl {
                specifier: target.to_owned(),
                source,
            })?;
            return Ok(self.remote_dependency(url));
        }

        if self.importer_remote {
            if !target.starts_with('/') && !is_relative(target) {
                return Err(RewriteError::Bare(specifier.to_owned()));
            }
            let url = join_remote(&self.importer, target).map_err(|source| {
                RewriteError::InvalidUrl {
                    specifier: target.to_owned(),
                    source,
                }
            })?;
            return Ok(self.remote_dependency(url));
        }

        let id = if mapped.is_some() && (target.starts_with('/') || target.starts_with("./")) {
            // Import map targets are relative to the project root.
            normalize_local(target)
        } else if target.starts_with('/') || is_relative(target) {
            resolve_local(&self.importer, target)
        } else {
            return Err(RewriteError::Bare(specifier.to_owned()));
        };

        if has_foreign_extension(&id) {
            return Ok(Rewrite::Passthrough(specifier.to_owned()));
        }
        let id = match self.resolve {
            Some(resolve) if SourceType::from_path(&id).is_none() => {
                resolve(&id).unwrap_or(id)
            }
            _ => id,
        };
        Ok(self.record(id, true))
    }

    fn remote_dependency(&mut self, url: String) -> Rewrite {
        if !self.cache_deps && SourceType::from_path(&url).is_none() {
            return Rewrite::Passthrough(url);
        }
        self.record(url, false)
    }

    fn record(&mut self, id: String, local: bool) -> Rewrite {
        let path = relative_specifier(&self.importer_stem, &module_stem(&id));
        let index = match self.deps.iter().position(|dep| *dep == id) {
            Some(index) => index,
            None => {
                self.deps.push(id);
                self.deps.len() - 1
            }
        };
        Rewrite::Dependency {
            index,
            path,
            hashed: local && !self.importer_remote,
        }
    }
}

/// Local ids with a non-transpilable extension (`.css`, `.json`) are assets.
fn has_foreign_extension(id: &str) -> bool {
    let name = id.rsplit('/').next().unwrap_or(id);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => SourceType::from_path(id).is_none(),
        _ => false,
    }
}
