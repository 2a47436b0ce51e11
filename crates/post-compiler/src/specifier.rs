//! Module ids and specifier arithmetic.
//!
//! Local module ids are project-root-relative and always start with `/`
//! (`/pages/index.tsx`). Remote module ids are absolute `http(s)` URLs as
//! normalized by [`url::Url`].
//!
//! Every module also has a *stem*: the path of its compiled output without
//! extension. Local stems mirror the source tree; remote stems live in the
//! flattened vendor namespace under `/-/<host>`.

use url::{Host, Url};

use crate::SourceType;

/// Root of the vendored remote module namespace.
pub const VENDOR_DIR: &str = "/-";

/// Check whether a specifier is an absolute `http(s)` URL.
#[must_use]
pub fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("https://") || specifier.starts_with("http://")
}

/// Check whether a remote specifier points at a local development server.
#[must_use]
pub fn is_loopback(specifier: &str) -> bool {
    let Ok(url) = Url::parse(specifier) else {
        return false;
    };
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}

/// Check whether a specifier is relative (`./x`, `../x`).
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Normalize an absolute remote URL.
pub fn normalize_remote(specifier: &str) -> Result<String, url::ParseError> {
    Url::parse(specifier).map(String::from)
}

/// Resolve `specifier` against the URL of a remote module.
pub fn join_remote(base: &str, specifier: &str) -> Result<String, url::ParseError> {
    Url::parse(base)?.join(specifier).map(String::from)
}

/// Normalize a local path into a module id.
///
/// Collapses empty and `.` segments, resolves `..` (clamped at the root) and
/// guarantees a leading `/`.
#[must_use]
pub fn normalize_local(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Resolve a local specifier imported by the local module `importer`.
///
/// Root-relative specifiers (`/lib/x.ts`) ignore the importer's directory.
#[must_use]
pub fn resolve_local(importer: &str, specifier: &str) -> String {
    if specifier.starts_with('/') {
        normalize_local(specifier)
    } else {
        normalize_local(&format!("{}/{specifier}", parent_dir(importer)))
    }
}

/// Directory part of a module id or stem (`/pages/index.tsx` -> `/pages`).
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Strip a transpilable extension (`.tsx`, `.ts`, `.jsx`, `.js`, ...).
#[must_use]
pub fn strip_transpilable_extension(path: &str) -> &str {
    match SourceType::from_path(path) {
        Some(_) => path.rsplit_once('.').map_or(path, |(stem, _)| stem),
        None => path,
    }
}

/// Compute the output stem of a module id.
///
/// ```
/// use post_compiler::specifier::module_stem;
///
/// assert_eq!(module_stem("/pages/index.tsx"), "/pages/index");
/// assert_eq!(
///     module_stem("https://esm.sh/react@17.0.1"),
///     "/-/esm.sh/react@17.0.1"
/// );
/// ```
#[must_use]
pub fn module_stem(id: &str) -> String {
    if is_remote(id) {
        remote_stem(id)
    } else {
        strip_transpilable_extension(id).to_owned()
    }
}

fn remote_stem(id: &str) -> String {
    let Ok(url) = Url::parse(id) else {
        return format!("{VENDOR_DIR}/{}", sanitize(id));
    };

    let mut host = sanitize(url.host_str().unwrap_or("unknown"));
    if let Some(port) = url.port() {
        host.push('_');
        host.push_str(&port.to_string());
    }

    let mut path = url.path().to_owned();
    if path.ends_with('/') {
        path.push_str("index");
    }

    let mut stem = format!("{VENDOR_DIR}/{host}{}", strip_transpilable_extension(&path));
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        stem.push('@');
        stem.push_str(&sanitize(query));
    }
    stem
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Relative specifier from the output of stem `from` to stem `to`.
///
/// The result always starts with `./`, so browsers never mistake it for a
/// bare specifier.
#[must_use]
pub fn relative_specifier(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = segments(parent_dir(from)).collect();
    let target: Vec<&str> = segments(to).collect();

    let common = from_dir
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count()
        .min(target.len().saturating_sub(1));

    let mut parts = vec![".."; from_dir.len() - common];
    parts.extend(&target[common..]);
    format!("./{}", parts.join("/"))
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
