//! Rendering collaborators.
//!
//! The project never renders components itself. It routes a location, picks
//! the compiled page module and hands it to a [`PageRenderer`]; static props
//! come from a [`ModuleExecutor`] that evaluates compiled code with an
//! explicit set of [`HostBindings`] and nothing else.
//!
//! [`ShellRenderer`] and [`NoopExecutor`] are the built-in implementations
//! used for client-rendered builds.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::RouterUrl;

/// Error from a renderer or executor.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Page rendering failed.
    #[error("render failed: {0}")]
    Render(String),
    /// Module evaluation failed.
    #[error("module execution failed: {0}")]
    Execution(String),
}

/// Globals a module executor may expose to evaluated code.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HostBindings {
    globals: BTreeMap<String, Value>,
}

impl HostBindings {
    /// Create an empty set of bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a global.
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.globals.insert(name.to_owned(), value);
        self
    }

    /// Look up a global.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// All globals, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.globals.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Compiled code handed to a [`ModuleExecutor`].
#[derive(Clone, Copy, Debug)]
pub struct ExecutionRequest<'a> {
    /// Output name of the entry module (`/pages/index.3f2a9c1b7.js`).
    pub entry: &'a str,
    /// Output name to compiled code for the entry and everything it imports.
    pub modules: &'a BTreeMap<String, String>,
    /// Globals available to the evaluated code.
    pub bindings: &'a HostBindings,
}

/// Capability-scoped evaluation of compiled modules.
pub trait ModuleExecutor: Send + Sync {
    /// Evaluate the entry module and return its static props, if it has any.
    fn static_props(&self, request: &ExecutionRequest<'_>) -> Result<Option<Value>, RenderError>;
}

/// Executor that never evaluates anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExecutor;

impl ModuleExecutor for NoopExecutor {
    fn static_props(&self, _request: &ExecutionRequest<'_>) -> Result<Option<Value>, RenderError> {
        Ok(None)
    }
}

/// Everything a renderer needs to produce a page.
#[derive(Clone, Copy, Debug)]
pub struct PageContext<'a> {
    /// Routed location.
    pub url: &'a RouterUrl,
    /// Module id of the page.
    pub page_id: &'a str,
    /// Request path of the compiled page module.
    pub page_script: &'a str,
    /// Request path of the compiled app module.
    pub app_script: Option<&'a str>,
    /// Static props returned by the executor.
    pub static_props: Option<&'a Value>,
}

/// Produces HTML for pages, missing routes and failures.
pub trait PageRenderer: Send + Sync {
    /// Render a matched page.
    fn render_page(&self, page: &PageContext<'_>) -> Result<String, RenderError>;

    /// Body for a location no page matched.
    fn render_not_found(&self, url: &RouterUrl) -> String;

    /// Body for a failed page (compile, execution or render error).
    fn render_error(&self, url: &RouterUrl, message: &str) -> String;
}

/// Renders an HTML shell that boots the page on the client.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRenderer;

impl PageRenderer for ShellRenderer {
    fn render_page(&self, page: &PageContext<'_>) -> Result<String, RenderError> {
        let props = page
            .static_props
            .map(|props| serde_json::to_string(props).map_err(|e| RenderError::Render(e.to_string())))
            .transpose()?
            .unwrap_or_else(|| "null".to_owned());

        let mut scripts = String::new();
        if let Some(app) = page.app_script {
            scripts.push_str(&format!(
                "<script type=\"module\" src=\"{}\"></script>\n",
                escape_html(app)
            ));
        }
        scripts.push_str(&format!(
            "<script type=\"module\" src=\"{}\"></script>\n",
            escape_html(page.page_script)
        ));

        Ok(format!(
            "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>\n\
             <main id=\"__post\"></main>\n\
             <script id=\"__post-data\" type=\"application/json\">{props}</script>\n\
             {scripts}</body>\n</html>\n",
            lang = escape_html(&page.url.locale),
            props = props.replace("</", "<\\/"),
        ))
    }

    fn render_not_found(&self, url: &RouterUrl) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"{}\">\n<body>\n<h1>404 - Page not found</h1>\n<p>{}</p>\n</body>\n</html>\n",
            escape_html(&url.locale),
            escape_html(&url.pathname)
        )
    }

    fn render_error(&self, url: &RouterUrl, message: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"{}\">\n<body>\n<h1>500 - Internal Server Error</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
            escape_html(&url.locale),
            escape_html(message)
        )
    }
}

/// Escape text for HTML content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn url() -> RouterUrl {
        RouterUrl {
            base_url: "/".to_owned(),
            locale: "en".to_owned(),
            pathname: "/".to_owned(),
            page_path: "/".to_owned(),
            ..RouterUrl::default()
        }
    }

    #[test]
    fn test_shell_renders_scripts_and_props() {
        let url = url();
        let props = json!({"title": "</script><b>"});
        let html = ShellRenderer
            .render_page(&PageContext {
                url: &url,
                page_id: "/pages/index.tsx",
                page_script: "/_post/pages/index.012345678.js",
                app_script: Some("/_post/app.abcdef012.js"),
                static_props: Some(&props),
            })
            .unwrap();

        assert!(html.contains("src=\"/_post/pages/index.012345678.js\""));
        assert!(html.contains("src=\"/_post/app.abcdef012.js\""));
        assert!(html.contains("<\\/script>"));
        assert!(!html.contains("</script><b>"));
    }

    #[test]
    fn test_error_body_is_escaped() {
        let body = ShellRenderer.render_error(&url(), "unexpected token <");
        assert!(body.contains("unexpected token &lt;"));
    }

    #[test]
    fn test_host_bindings() {
        let bindings = HostBindings::new()
            .with("location", json!("/about"))
            .with("baseUrl", json!("/"));
        assert_eq!(bindings.get("location"), Some(&json!("/about")));
        assert_eq!(
            bindings.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            ["baseUrl", "location"]
        );
    }
}
