//! Configuration management for Post.
//!
//! Parses the optional `post.config.json` project file and the layered
//! import map ([`ImportMap`]).
//!
//! The config file is read leniently: unknown keys and keys with the wrong
//! type are logged and ignored, so a typo never prevents the project from
//! starting. Only an unreadable file or a document that is not JSON at all is
//! an error.
//!
//! CLI settings can be applied during load via [`ConfigOverrides`].

mod expand;
mod import_map;

use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde_json::{Map, Value};

pub use import_map::{IMPORT_MAP_ENV, IMPORT_MAP_FILENAME, ImportMap};

/// Configuration filename looked up in the project root.
pub const CONFIG_FILENAME: &str = "post.config.json";

/// Default limit for local module sources (10 MiB).
pub const DEFAULT_MAX_MODULE_SIZE: u64 = 10 * 1024 * 1024;

/// Characters escaped in `baseUrl`, matching `encodeURI`.
const URI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    /// Override the source directory.
    pub src_dir: Option<PathBuf>,
    /// Override the build output directory.
    pub output_dir: Option<PathBuf>,
    /// Override remote dependency vendoring.
    pub cache_deps: Option<bool>,
    /// Override source map emission.
    pub source_map: Option<bool>,
}

/// Resolved project configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project root directory.
    pub root_dir: PathBuf,
    /// Directory holding `pages/`, `components/`, `app.tsx`, ...
    pub src_dir: PathBuf,
    /// Directory written by `post build`.
    pub output_dir: PathBuf,
    /// URL prefix the application is served under (`/` or `/docs`, never a trailing slash).
    pub base_url: String,
    /// Vendor remote dependencies into the local cache.
    pub cache_deps: bool,
    /// Default locale for the route manifest.
    pub default_locale: String,
    /// Emit `.js.map` files next to compiled artifacts.
    pub source_map: bool,
    /// Size limit for local module sources, in bytes.
    pub max_module_size: u64,
    /// Path to the config file, if one was found.
    pub config_path: Option<PathBuf>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error.
    #[error("JSON parse error in {origin}: {source}")]
    Json {
        /// File path or environment variable the document came from.
        origin: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`imports.react`").
        field: String,
        /// Error message (e.g., "${`CDN_HOST`} not set").
        message: String,
    },
}

impl ProjectConfig {
    /// Default configuration for a project rooted at `root`.
    #[must_use]
    pub fn default_with_root(root: &Path) -> Self {
        Self {
            root_dir: root.to_path_buf(),
            src_dir: root.to_path_buf(),
            output_dir: root.join("out"),
            base_url: "/".to_owned(),
            cache_deps: true,
            default_locale: "en".to_owned(),
            source_map: false,
            max_module_size: DEFAULT_MAX_MODULE_SIZE,
            config_path: None,
        }
    }

    /// Load `post.config.json` from `root` (if present) and apply overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not JSON.
    pub fn load(root: &Path, overrides: Option<&ConfigOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default_with_root(root);

        let path = root.join(CONFIG_FILENAME);
        if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            let value: Value =
                serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                    origin: path.display().to_string(),
                    source,
                })?;
            match value {
                Value::Object(map) => config.apply_document(&map),
                _ => tracing::error!(
                    path = %path.display(),
                    "config file is not a JSON object, using defaults"
                ),
            }
            config.config_path = Some(path);
        }

        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }

        Ok(config)
    }

    /// Apply recognised keys from a parsed config document.
    fn apply_document(&mut self, map: &Map<String, Value>) {
        let mut lang = None;
        let mut default_locale = None;

        for (key, value) in map {
            match key.as_str() {
                "srcDir" => {
                    if let Some(dir) = expect_str(key, value) {
                        self.src_dir = join_root(&self.root_dir, dir);
                    }
                }
                "outputDir" => {
                    if let Some(dir) = expect_str(key, value) {
                        self.output_dir = join_root(&self.root_dir, dir);
                    }
                }
                "baseUrl" => {
                    if let Some(url) = expect_str(key, value) {
                        self.base_url = clean_base_url(url);
                    }
                }
                "cacheDeps" => {
                    if let Some(flag) = expect_bool(key, value) {
                        self.cache_deps = flag;
                    }
                }
                "sourceMap" => {
                    if let Some(flag) = expect_bool(key, value) {
                        self.source_map = flag;
                    }
                }
                "maxModuleSize" => match value.as_u64() {
                    Some(size) if size > 0 => self.max_module_size = size,
                    _ => tracing::error!(key = %key, "expected a positive integer, ignoring"),
                },
                "lang" => lang = expect_str(key, value).map(str::to_owned),
                "defaultLocale" => default_locale = expect_str(key, value).map(str::to_owned),
                _ => tracing::error!(key = %key, "unrecognized config key, ignoring"),
            }
        }

        if let Some(locale) = default_locale.or(lang).filter(|l| !l.is_empty()) {
            self.default_locale = locale;
        }
    }

    /// Apply CLI overrides to the configuration.
    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(src_dir) = &overrides.src_dir {
            self.src_dir.clone_from(src_dir);
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.output_dir.clone_from(output_dir);
        }
        if let Some(cache_deps) = overrides.cache_deps {
            self.cache_deps = cache_deps;
        }
        if let Some(source_map) = overrides.source_map {
            self.source_map = source_map;
        }
    }

    /// Cache directory (`<root>/.cache`).
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.root_dir.join(".cache")
    }
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Option<&'a str> {
    let s = value.as_str();
    if s.is_none() {
        tracing::error!(key = %key, "expected a string, ignoring");
    }
    s
}

fn expect_bool(key: &str, value: &Value) -> Option<bool> {
    let b = value.as_bool();
    if b.is_none() {
        tracing::error!(key = %key, "expected a boolean, ignoring");
    }
    b
}

/// Resolve a config directory (`/out`, `src`) against the project root.
fn join_root(root: &Path, dir: &str) -> PathBuf {
    let trimmed = dir.trim_start_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

/// URI-encode and path-clean a base URL.
///
/// The result always starts with `/` and has no trailing slash unless it is
/// the root itself.
#[must_use]
pub fn clean_base_url(url: &str) -> String {
    let encoded = utf8_percent_encode(url, URI_ESCAPE).to_string();
    let mut segments: Vec<&str> = Vec::new();
    for segment in encoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}
