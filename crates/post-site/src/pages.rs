//! Source tree discovery and the page table.

use std::fs;
use std::io;
use std::path::Path;

use post_compiler::SourceType;
use post_compiler::specifier::strip_transpilable_extension;

use crate::router::is_dynamic;

/// Directories walked for modules, relative to the source directory.
pub const MODULE_DIRS: [&str; 2] = ["pages", "components"];

/// Module id prefix of page modules.
const PAGES_PREFIX: &str = "/pages";

/// Collect module ids under [`MODULE_DIRS`], sorted.
///
/// Entries starting with `.` or `_` and files that are not js/jsx/ts/tsx are
/// skipped. Missing directories are not an error.
pub fn discover(src_dir: &Path) -> io::Result<Vec<String>> {
    let mut ids = Vec::new();
    for dir in MODULE_DIRS {
        let path = src_dir.join(dir);
        if path.is_dir() {
            walk(&path, &format!("/{dir}"), &mut ids)?;
        }
    }
    ids.sort();
    Ok(ids)
}

fn walk(dir: &Path, prefix: &str, ids: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }

        let id = format!("{prefix}/{name}");
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), &id, ids)?;
        } else if SourceType::from_path(name).is_some() {
            ids.push(id);
        }
    }
    Ok(())
}

/// Route path of a page module id, `None` for non-page modules.
///
/// `index` segments collapse: `/pages/index.tsx` is `/`, and
/// `/pages/docs/index.tsx` is `/docs`.
#[must_use]
pub fn page_route(id: &str) -> Option<String> {
    let rest = id.strip_prefix(PAGES_PREFIX)?.strip_prefix('/')?;
    if SourceType::from_path(rest).is_none() {
        return None;
    }

    let rest = strip_transpilable_extension(rest);
    let route = if rest == "index" {
        ""
    } else {
        rest.strip_suffix("/index").unwrap_or(rest)
    };
    Some(format!("/{route}"))
}

/// Route to module id mapping in matching order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<(String, String)>,
}

impl PageTable {
    /// Build a table from module ids; non-page ids are ignored.
    ///
    /// Static routes come before dynamic ones, each group sorted, so
    /// `/blog/new` is matched before `/blog/$slug`.
    pub fn from_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut entries: Vec<(String, String)> = ids
            .into_iter()
            .filter_map(|id| page_route(id).map(|route| (route, id.to_owned())))
            .collect();
        entries.sort_by(|(a, _), (b, _)| is_dynamic(a).cmp(&is_dynamic(b)).then_with(|| a.cmp(b)));
        entries.dedup_by(|(a, _), (b, _)| a == b);
        Self { entries }
    }

    /// Route paths in matching order.
    #[must_use]
    pub fn routes(&self) -> Vec<String> {
        self.entries.iter().map(|(route, _)| route.clone()).collect()
    }

    /// Module id serving `route`.
    #[must_use]
    pub fn module_id(&self, route: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| r == route)
            .map(|(_, id)| id.as_str())
    }

    /// `(route, module id)` pairs in matching order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(r, id)| (r.as_str(), id.as_str()))
    }

    /// Number of pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the table has no pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
