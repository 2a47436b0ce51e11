//! Route manifest served to the client runtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// App module descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppModule {
    /// Output hash of the app module.
    pub hash: String,
}

/// Page module descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageModule {
    /// Module id of the page (`/pages/index.tsx`).
    pub path: String,
    /// Output hash of the page module.
    pub hash: String,
}

/// Read-only projection of the module graph for routing on the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Application base URL.
    pub base_url: String,
    /// Default locale.
    pub default_locale: String,
    /// Locale dictionaries keyed by locale.
    pub locales: BTreeMap<String, serde_json::Value>,
    /// App module, if the project has one.
    pub app_module: Option<AppModule>,
    /// Page modules keyed by route path.
    pub page_modules: BTreeMap<String, PageModule>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_manifest_json_shape() {
        let manifest = Manifest {
            base_url: "/".to_owned(),
            default_locale: "en".to_owned(),
            locales: BTreeMap::new(),
            app_module: None,
            page_modules: BTreeMap::from([(
                "/".to_owned(),
                PageModule {
                    path: "/pages/index.tsx".to_owned(),
                    hash: "abc".to_owned(),
                },
            )]),
        };

        assert_eq!(
            serde_json::to_value(&manifest).unwrap(),
            json!({
                "baseUrl": "/",
                "defaultLocale": "en",
                "locales": {},
                "appModule": null,
                "pageModules": {"/": {"path": "/pages/index.tsx", "hash": "abc"}},
            })
        );
    }
}
