//! Module records.

use std::path::PathBuf;

use post_cache::hash_prefix;
use post_compiler::specifier::module_stem;
use post_compiler::{HashSlot, SourceType};
use serde::{Deserialize, Serialize};

/// Dependency edge of a module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    /// Resolved module id of the dependency (local path or remote URL).
    pub path: String,
    /// Last known output hash of the dependency; empty until compiled.
    pub hash: String,
}

/// A compiled module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    /// Module id: `/pages/index.tsx` or `https://esm.sh/react@17.0.1`.
    pub id: String,
    /// Source language.
    pub source_type: SourceType,
    /// Content hash of the raw source.
    pub source_hash: String,
    /// Fetched over the network (or mapped to a network location).
    pub is_remote: bool,
    /// Content hash of `js_content`.
    pub hash: String,
    /// Compiled JavaScript.
    pub js_content: String,
    /// Source map JSON.
    pub source_map: Option<String>,
    /// Persisted artifact path.
    pub js_file: PathBuf,
    /// Dependencies in first-occurrence order.
    pub deps: Vec<Dependency>,
    /// Byte ranges in `js_content` holding dependency hash prefixes.
    pub slots: Vec<HashSlot>,
}

impl Module {
    /// Output stem (`/pages/index`, `/-/esm.sh/react@17.0.1`).
    #[must_use]
    pub fn stem(&self) -> String {
        module_stem(&self.id)
    }

    /// Output file name relative to the artifact root.
    ///
    /// Local modules carry their hash prefix, vendored remote modules don't.
    #[must_use]
    pub fn output_name(&self) -> String {
        if self.is_remote {
            format!("{}.js", self.stem())
        } else {
            format!("{}.{}.js", self.stem(), hash_prefix(&self.hash))
        }
    }

    pub(crate) fn meta(&self) -> ModuleMeta {
        ModuleMeta {
            source_file: self.id.clone(),
            source_type: self.source_type,
            source_hash: self.source_hash.clone(),
            hash: self.hash.clone(),
            deps: self.deps.clone(),
            slots: self.slots.clone(),
            is_remote: self.is_remote,
        }
    }
}

/// An extra output name of a local module.
///
/// A module compiled inside an import cycle can reference its importer under
/// the hash the importer had before the cycle closed. The alias serves the
/// importer's current artifact under that older name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputAlias {
    /// Hash prefix embedded in the referenced file name.
    pub prefix: String,
    /// Module whose current artifact the alias serves.
    pub module: Module,
}

impl OutputAlias {
    /// Referenced file name relative to the artifact root.
    #[must_use]
    pub fn output_name(&self) -> String {
        format!("{}.{}.js", self.module.stem(), self.prefix)
    }
}

/// Persisted form of a module (`<stem>.meta.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMeta {
    /// Module id.
    pub source_file: String,
    /// Source language.
    #[serde(default)]
    pub source_type: SourceType,
    /// Content hash of the raw source.
    pub source_hash: String,
    /// Content hash of the compiled artifact.
    pub hash: String,
    /// Dependencies with their last known hashes.
    #[serde(default)]
    pub deps: Vec<Dependency>,
    /// Hash slots of the compiled artifact.
    #[serde(default)]
    pub slots: Vec<HashSlot>,
    /// Remote module flag.
    #[serde(default)]
    pub is_remote: bool,
}
