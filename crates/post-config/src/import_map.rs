//! Import maps.
//!
//! An import map redirects bare or aliased specifiers before dependency
//! resolution. Maps are layered, lowest precedence first:
//!
//! 1. [`ImportMap::builtin`] - the process-wide default
//! 2. the `POST_IMPORT_MAP` environment variable (a JSON import map document)
//! 3. `<root>/import_map.json`
//!
//! Later layers override earlier ones key by key.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::expand::expand_env;

/// Project-local import map filename.
pub const IMPORT_MAP_FILENAME: &str = "import_map.json";

/// Environment variable holding an import map override.
pub const IMPORT_MAP_ENV: &str = "POST_IMPORT_MAP";

const REACT_VERSION: &str = "17.0.1";

/// Specifier redirection table (`{ "imports": { specifier: target } }`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMap {
    /// Specifier to target mapping. Keys ending in `/` alias a whole namespace.
    #[serde(default)]
    pub imports: BTreeMap<String, String>,
}

impl ImportMap {
    /// The process-wide default map.
    #[must_use]
    pub fn builtin() -> Self {
        let mut imports = BTreeMap::new();
        for name in ["react", "react-dom", "react-dom/server"] {
            let (package, subpath) = name.split_once('/').unwrap_or((name, ""));
            let target = if subpath.is_empty() {
                format!("https://esm.sh/{package}@{REACT_VERSION}")
            } else {
                format!("https://esm.sh/{package}@{REACT_VERSION}/{subpath}")
            };
            imports.insert(name.to_owned(), target);
        }
        Self { imports }
    }

    /// Parse an import map document, expanding `${VAR}` references in targets.
    ///
    /// `origin` names the document in error messages (a file path or the
    /// environment variable name).
    pub fn from_json(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let raw: Self = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            origin: origin.to_owned(),
            source,
        })?;

        let mut imports = BTreeMap::new();
        for (key, target) in raw.imports {
            let expanded = expand_env(&target, &format!("{origin}: imports.{key}"))?;
            imports.insert(key, expanded);
        }
        Ok(Self { imports })
    }

    /// Load the layered import map for a project root.
    ///
    /// Reads the override from the `POST_IMPORT_MAP` environment variable.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let env_value = std::env::var(IMPORT_MAP_ENV).ok();
        Self::load_with_env(root, env_value.as_deref())
    }

    /// Load the layered import map with an explicit environment override.
    pub fn load_with_env(root: &Path, env_value: Option<&str>) -> Result<Self, ConfigError> {
        let mut map = Self::builtin();

        if let Some(text) = env_value.filter(|t| !t.trim().is_empty()) {
            map.merge(Self::from_json(text, IMPORT_MAP_ENV)?);
        }

        let path = root.join(IMPORT_MAP_FILENAME);
        if path.is_file() {
            let text = fs::read_to_string(&path)?;
            map.merge(Self::from_json(&text, &path.display().to_string())?);
            tracing::debug!(path = %path.display(), "loaded project import map");
        }

        Ok(map)
    }

    /// Overlay `other` on top of this map; keys in `other` win.
    pub fn merge(&mut self, other: ImportMap) {
        self.imports.extend(other.imports);
    }

    /// Look up the target for a specifier.
    ///
    /// Exact keys win. Otherwise the longest key ending in `/` that prefixes
    /// the specifier is used and the remainder is appended to its target.
    #[must_use]
    pub fn resolve(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.imports.get(specifier) {
            return Some(target.clone());
        }

        self.imports
            .iter()
            .filter(|(key, _)| key.ends_with('/') && specifier.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(key, target)| format!("{target}{}", &specifier[key.len()..]))
    }

    /// Check whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}
