//! Module source languages.

use serde::{Deserialize, Serialize};

/// Source language of a module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Plain JavaScript module.
    #[default]
    Js,
    /// JavaScript with JSX.
    Jsx,
    /// TypeScript.
    Ts,
    /// TypeScript with JSX.
    Tsx,
}

impl SourceType {
    /// Every transpilable type, in extension probing order.
    pub const ALL: [SourceType; 4] = [Self::Tsx, Self::Ts, Self::Jsx, Self::Js];

    /// Map a file extension (without the dot) to a source type.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" | "mjs" => Some(Self::Js),
            "jsx" => Some(Self::Jsx),
            "ts" | "mts" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            _ => None,
        }
    }

    /// Source type implied by the extension of the last path segment.
    ///
    /// Query strings and fragments are ignored, so remote URLs can be passed
    /// directly.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let name = path.rsplit('/').next().unwrap_or(path);
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Source type announced by an HTTP `Content-Type` header.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/typescript" | "text/typescript" | "application/x-typescript" => {
                Some(Self::Ts)
            }
            "text/tsx" => Some(Self::Tsx),
            "text/jsx" => Some(Self::Jsx),
            "application/javascript" | "text/javascript" | "application/ecmascript" => {
                Some(Self::Js)
            }
            _ => None,
        }
    }

    /// Resolve the type of a fetched remote module.
    ///
    /// The URL extension is authoritative unless it is missing or plain `.js`,
    /// in which case a more specific `Content-Type` upgrades it.
    #[must_use]
    pub fn sniff(url: &str, content_type: Option<&str>) -> Self {
        let by_path = Self::from_path(url);
        let by_header = content_type.and_then(Self::from_content_type);
        match (by_path, by_header) {
            (None | Some(Self::Js), Some(header)) => header,
            (Some(path), _) => path,
            (None, None) => Self::Js,
        }
    }

    /// Canonical file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
        }
    }

    pub(crate) fn to_oxc(self) -> oxc_span::SourceType {
        match self {
            Self::Js => oxc_span::SourceType::mjs(),
            Self::Jsx => oxc_span::SourceType::jsx(),
            Self::Ts => oxc_span::SourceType::ts(),
            Self::Tsx => oxc_span::SourceType::tsx(),
        }
    }
}
