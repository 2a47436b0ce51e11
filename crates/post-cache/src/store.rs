//! On-disk artifact store.
//!
//! [`ArtifactStore`] mirrors the module tree under a cache root. Every module
//! is addressed by its *stem*: the module's output path without extension,
//! relative to the cache root (`pages/index`, `-/esm.sh/react@17.0.1`).
//!
//! ```text
//! {root}/
//! +-- VERSION                         # cache format version
//! +-- pages/
//! |   +-- index.meta.json             # module metadata
//! |   +-- index.3f2a9c1b7.js          # content-addressed artifact
//! |   +-- index.3f2a9c1b7.js.map      # optional source map
//! +-- -/esm.sh/
//!     +-- react@17.0.1.meta.json
//!     +-- react@17.0.1.js             # vendored remote modules carry no hash
//! ```
//!
//! Stale artifacts are never deleted; a new hash simply lands next to the old
//! file. Opening a store written by another compiler version empties it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::hash::hash_prefix;

/// File-based artifact store rooted at a directory on disk.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store at `root`, validating the cache version.
    ///
    /// A store left by a compiler with a different `version` (or none) is
    /// emptied first. Failing to reset it only logs a warning.
    #[must_use]
    pub fn open(root: PathBuf, version: &str) -> Self {
        ensure_version(&root, version);
        Self { root }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the metadata file for `stem`.
    #[must_use]
    pub fn meta_path(&self, stem: &str) -> PathBuf {
        self.entry_path(&format!("{stem}.meta.json"))
    }

    /// Path of the compiled artifact for `stem`.
    ///
    /// Local modules pass their hash, which embeds its prefix in the file
    /// name; vendored remote modules pass `None`.
    #[must_use]
    pub fn artifact_path(&self, stem: &str, hash: Option<&str>) -> PathBuf {
        match hash {
            Some(hash) => self.entry_path(&format!("{stem}.{}.js", hash_prefix(hash))),
            None => self.entry_path(&format!("{stem}.js")),
        }
    }

    /// Path of the source map written next to `artifact`.
    #[must_use]
    pub fn source_map_path(artifact: &Path) -> PathBuf {
        let mut name = artifact.as_os_str().to_owned();
        name.push(".map");
        PathBuf::from(name)
    }

    /// Read and decode the metadata file for `stem`.
    ///
    /// A missing file is a silent miss; unreadable or undecodable metadata is
    /// logged and also treated as a miss.
    pub fn read_meta<T: DeserializeOwned>(&self, stem: &str) -> Option<T> {
        let path = self.meta_path(stem);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read cache metadata: {e}");
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring corrupt cache metadata: {e}");
                None
            }
        }
    }

    /// Read a previously written artifact or source map.
    pub fn read_text(path: &Path) -> Option<String> {
        fs::read_to_string(path).ok()
    }

    /// Persist metadata, artifact and optional source map for one module.
    ///
    /// Writes happen in that order; parent directories are created as needed.
    pub fn write<T: Serialize>(
        &self,
        stem: &str,
        meta: &T,
        artifact: &Path,
        code: &str,
        source_map: Option<&str>,
    ) -> io::Result<()> {
        let meta_path = self.meta_path(stem);
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(meta).map_err(io::Error::other)?;
        fs::write(&meta_path, json)?;
        Self::write_artifact(artifact, code, source_map)
    }

    /// Write compiled code, and its source map if any, without metadata.
    ///
    /// Used for extra names of an artifact whose metadata lives elsewhere.
    pub fn write_artifact(
        artifact: &Path,
        code: &str,
        source_map: Option<&str>,
    ) -> io::Result<()> {
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(artifact, code)?;
        if let Some(map) = source_map {
            fs::write(Self::source_map_path(artifact), map)?;
        }

        tracing::debug!(artifact = %artifact.display(), "persisted module artifact");
        Ok(())
    }

    fn entry_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }
}

/// Name of the file holding the compiler cache version.
const VERSION_FILE: &str = "VERSION";

/// Start from an empty store unless `root` was written by `version`.
fn ensure_version(root: &Path, version: &str) {
    let version_file = root.join(VERSION_FILE);
    let stored = fs::read_to_string(&version_file).ok();
    if stored.as_deref() == Some(version) {
        return;
    }

    match stored {
        Some(stored) => tracing::info!(
            root = %root.display(),
            stored = %stored.trim(),
            current = version,
            "discarding artifacts of another compiler version"
        ),
        None => tracing::debug!(root = %root.display(), "creating artifact store"),
    }
    if let Err(e) = reset(root, &version_file, version) {
        tracing::warn!(root = %root.display(), "failed to reset artifact store: {e}");
    }
}

fn reset(root: &Path, version_file: &Path, version: &str) -> io::Result<()> {
    match fs::remove_dir_all(root) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    fs::create_dir_all(root)?;
    fs::write(version_file, version)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Meta {
        hash: String,
    }

    #[test]
    fn test_paths() {
        let store = ArtifactStore {
            root: PathBuf::from("/p/.cache"),
        };
        assert_eq!(
            store.meta_path("pages/index"),
            PathBuf::from("/p/.cache/pages/index.meta.json")
        );
        assert_eq!(
            store.artifact_path("pages/index", Some("0123456789abcdef")),
            PathBuf::from("/p/.cache/pages/index.012345678.js")
        );
        assert_eq!(
            store.artifact_path("/-/esm.sh/react", None),
            PathBuf::from("/p/.cache/-/esm.sh/react.js")
        );
        assert_eq!(
            ArtifactStore::source_map_path(Path::new("/p/.cache/a.012345678.js")),
            PathBuf::from("/p/.cache/a.012345678.js.map")
        );
    }

    #[test]
    fn test_write_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path().join(".cache"), "v1");
        let artifact = store.artifact_path("components/nav", Some("abcdef0123"));

        store
            .write(
                "components/nav",
                &Meta {
                    hash: "abcdef0123".to_owned(),
                },
                &artifact,
                "export default 1;",
                Some("{}"),
            )
            .unwrap();

        let meta: Meta = store.read_meta("components/nav").unwrap();
        assert_eq!(meta.hash, "abcdef0123");
        assert_eq!(
            ArtifactStore::read_text(&artifact).as_deref(),
            Some("export default 1;")
        );
        assert_eq!(
            ArtifactStore::read_text(&ArtifactStore::source_map_path(&artifact)).as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn test_missing_meta_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path().join(".cache"), "v1");
        assert_eq!(store.read_meta::<Meta>("nope"), None);
    }

    #[test]
    fn test_corrupt_meta_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path().join(".cache"), "v1");
        fs::write(store.meta_path("broken"), b"{ not json").unwrap();
        assert_eq!(store.read_meta::<Meta>("broken"), None);
    }

    #[test]
    fn test_write_artifact_without_meta() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::open(tmp.path().join(".cache"), "v1");
        let alias = store.artifact_path("lib/a", Some("0f0f0f0f0"));

        ArtifactStore::write_artifact(&alias, "export const a = 1;", None).unwrap();

        assert_eq!(
            ArtifactStore::read_text(&alias).as_deref(),
            Some("export const a = 1;")
        );
        assert!(!ArtifactStore::source_map_path(&alias).exists());
        assert_eq!(store.read_meta::<Meta>("lib/a"), None);
    }

    #[test]
    fn test_reopen_same_compiler_keeps_artifacts() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".cache");

        let store = ArtifactStore::open(root.clone(), "post-0.1.0-1");
        let artifact = store.artifact_path("pages/index", Some("123456789abc"));
        store
            .write(
                "pages/index",
                &Meta {
                    hash: "123456789abc".to_owned(),
                },
                &artifact,
                "export default 1;",
                None,
            )
            .unwrap();

        let reopened = ArtifactStore::open(root, "post-0.1.0-1");
        assert_eq!(
            reopened.read_meta::<Meta>("pages/index").map(|m| m.hash),
            Some("123456789abc".to_owned())
        );
        assert!(artifact.is_file());
    }

    #[test]
    fn test_other_compiler_version_empties_store() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".cache");

        let store = ArtifactStore::open(root.clone(), "post-0.1.0-1");
        let artifact = store.artifact_path("/-/esm.sh/react@17.0.1", None);
        store
            .write(
                "/-/esm.sh/react@17.0.1",
                &Meta {
                    hash: "h".to_owned(),
                },
                &artifact,
                "export default {};",
                None,
            )
            .unwrap();

        let reopened = ArtifactStore::open(root.clone(), "post-0.2.0-1");
        assert_eq!(reopened.read_meta::<Meta>("/-/esm.sh/react@17.0.1"), None);
        assert!(!artifact.exists());
        assert_eq!(
            fs::read_to_string(root.join(VERSION_FILE)).unwrap(),
            "post-0.2.0-1"
        );
    }

    #[test]
    fn test_unversioned_directory_is_reset() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".cache");
        fs::create_dir_all(root.join("pages")).unwrap();
        fs::write(root.join("pages/stray.js"), "x").unwrap();

        ArtifactStore::open(root.clone(), "post-0.1.0-1");

        assert!(!root.join("pages/stray.js").exists());
        assert_eq!(
            fs::read_to_string(root.join(VERSION_FILE)).unwrap(),
            "post-0.1.0-1"
        );
    }
}
