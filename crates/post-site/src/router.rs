//! Location to page routing.
//!
//! Page paths are route patterns: `$name` captures one segment, `*name`
//! captures one or more trailing segments joined by `/`. Candidates are tried
//! in the order given; the first match wins.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde::Serialize;

/// Routing settings.
#[derive(Clone, Debug, Default)]
pub struct RouteOptions<'a> {
    /// Page path used when nothing matches (`/404`).
    pub fallback: Option<&'a str>,
    /// Locales recognised as a leading path segment.
    pub locales: &'a [String],
    /// Locale used when the location carries none.
    pub default_locale: &'a str,
}

/// A routed location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterUrl {
    /// Application base URL.
    pub base_url: String,
    /// Locale of the location.
    pub locale: String,
    /// Location path below the base URL and locale, without trailing slash.
    pub pathname: String,
    /// Matched page path; empty when nothing matched and there is no fallback.
    pub page_path: String,
    /// Captured route parameters.
    pub params: BTreeMap<String, String>,
    /// Raw query string without `?`.
    pub query: String,
}

impl RouterUrl {
    /// Check whether a page was matched (or the fallback applied).
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.page_path.is_empty()
    }
}

/// Route `location` to one of `page_paths`.
#[must_use]
pub fn route(
    base_url: &str,
    page_paths: &[String],
    location: &str,
    options: &RouteOptions<'_>,
) -> RouterUrl {
    let (path, query) = location
        .split_once('?')
        .map_or((location, ""), |(path, query)| (path, query));
    let path = path.split('#').next().unwrap_or_default();
    let path = strip_base(base_url, path);

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut locale = options.default_locale.to_owned();
    if let Some(first) = segments.first()
        && options.locales.iter().any(|l| l.as_str() == *first)
    {
        locale = (*first).to_owned();
        segments.remove(0);
    }

    let mut url = RouterUrl {
        base_url: base_url.to_owned(),
        locale,
        pathname: format!("/{}", segments.join("/")),
        query: query.to_owned(),
        ..RouterUrl::default()
    };

    for page_path in page_paths {
        if let Some(params) = match_pattern(page_path, &segments) {
            url.page_path.clone_from(page_path);
            url.params = params;
            return url;
        }
    }

    if let Some(fallback) = options.fallback {
        url.page_path = fallback.to_owned();
    }
    url
}

fn strip_base<'p>(base_url: &str, path: &'p str) -> &'p str {
    if base_url == "/" {
        return path;
    }
    match path.strip_prefix(base_url) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

fn match_pattern(pattern: &str, segments: &[&str]) -> Option<BTreeMap<String, String>> {
    let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let mut params = BTreeMap::new();

    for (index, part) in parts.iter().enumerate() {
        if let Some(name) = part.strip_prefix('*') {
            let rest = segments.get(index..).filter(|rest| !rest.is_empty())?;
            let value: Vec<String> = rest.iter().map(|s| decode(s)).collect();
            params.insert(name.to_owned(), value.join("/"));
            return Some(params);
        }

        let segment = segments.get(index)?;
        if let Some(name) = part.strip_prefix('$') {
            params.insert(name.to_owned(), decode(segment));
        } else if part != segment {
            return None;
        }
    }

    (parts.len() == segments.len()).then_some(params)
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Check whether a page path contains wildcards.
#[must_use]
pub fn is_dynamic(page_path: &str) -> bool {
    page_path
        .split('/')
        .any(|s| s.starts_with('$') || s.starts_with('*'))
}
