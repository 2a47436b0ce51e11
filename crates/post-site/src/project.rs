//! Project orchestration.
//!
//! [`Project`] owns the module graph of one project and exposes the
//! boundary operations used by servers and the CLI: the route manifest,
//! compiled module lookup by request path, page rendering, change
//! propagation and the static build.
//!
//! # Thread Safety
//!
//! `Project` is `Send + Sync`. Every graph operation runs behind one
//! `Mutex`, so compiles of the same module never interleave. The page table
//! is an `Arc` snapshot swapped under a `RwLock`.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use post_cache::{ArtifactStore, HASH_PREFIX_LEN};
use post_compiler::SourceType;
use post_config::{ConfigOverrides, ImportMap, ProjectConfig};
use post_fetch::{Fetcher, HttpClient, UreqClient};
use post_graph::{CACHE_VERSION, CompileOptions, GraphError, GraphOptions, Module, ModuleGraph};
use serde_json::{Value, json};

use crate::ProjectError;
use crate::manifest::{AppModule, Manifest, PageModule};
use crate::pages::{self, PageTable, page_route};
use crate::render::{
    ExecutionRequest, HostBindings, ModuleExecutor, NoopExecutor, PageContext, PageRenderer,
    ShellRenderer,
};
use crate::router::{self, RouteOptions, RouterUrl, is_dynamic};

/// Request path segment under which compiled modules are served.
pub const MODULE_PREFIX: &str = "/_post";

/// Route of the not-found page, used as routing fallback when present.
pub const NOT_FOUND_ROUTE: &str = "/404";

/// Name of the manifest written by [`Project::build`].
pub const MANIFEST_FILENAME: &str = "manifest.json";

const APP_MODULE_NAME: &str = "app";
const LOCALES_DIR: &str = "i18n";

/// Settings for [`Project::open`].
pub struct ProjectOptions {
    /// Production mode: compile failures during open are fatal and pages are
    /// served from the graph without recompiling.
    pub production: bool,
    /// Values overriding `post.config.json`.
    pub overrides: ConfigOverrides,
    /// Import map to use instead of loading one from the project.
    pub import_map: Option<ImportMap>,
    /// HTTP client for remote modules; a [`UreqClient`] when `None`.
    pub http_client: Option<Arc<dyn HttpClient>>,
    /// Page body renderer.
    pub renderer: Arc<dyn PageRenderer>,
    /// Evaluator for static props.
    pub executor: Arc<dyn ModuleExecutor>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            production: false,
            overrides: ConfigOverrides::default(),
            import_map: None,
            http_client: None,
            renderer: Arc::new(ShellRenderer),
            executor: Arc::new(NoopExecutor),
        }
    }
}

/// A compiled module matched by [`Project::get_module`].
#[derive(Clone, Debug)]
pub struct ServedModule {
    /// Module snapshot.
    pub module: Module,
    /// Whether the source map was requested instead of the code.
    pub is_source_map: bool,
}

impl ServedModule {
    /// Response body: compiled code or source map.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        if self.is_source_map {
            self.module.source_map.as_deref()
        } else {
            Some(&self.module.js_content)
        }
    }

    /// Response content type.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        if self.is_source_map {
            "application/json; charset=utf-8"
        } else {
            "application/javascript; charset=utf-8"
        }
    }
}

/// Result of [`Project::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildSummary {
    /// Output directory.
    pub output_dir: PathBuf,
    /// Module files written (local and vendored).
    pub modules: usize,
    /// HTML pages written.
    pub pages: usize,
    /// Pages that failed to render and were skipped.
    pub failed_pages: Vec<String>,
}

/// A project: configuration, module graph and page table.
pub struct Project {
    config: ProjectConfig,
    production: bool,
    graph: Mutex<ModuleGraph>,
    pages: RwLock<Arc<PageTable>>,
    app_module: RwLock<Option<String>>,
    locales: BTreeMap<String, Value>,
    renderer: Arc<dyn PageRenderer>,
    executor: Arc<dyn ModuleExecutor>,
}

impl Project {
    /// Open the project at `root`, compiling every discovered module.
    ///
    /// Oversized files are skipped with a warning. Other per-file failures
    /// are logged and skipped, except compile errors in production mode.
    /// The app module is required to compile whenever it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or import map cannot be loaded,
    /// the source tree cannot be walked, or a required module fails.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn open(root: &Path, options: ProjectOptions) -> Result<Self, ProjectError> {
        let config = ProjectConfig::load(root, Some(&options.overrides))?;
        let import_map = match options.import_map {
            Some(map) => map,
            None => ImportMap::load(&config.root_dir)?,
        };

        let store = ArtifactStore::open(config.cache_dir(), CACHE_VERSION);
        let client = options
            .http_client
            .unwrap_or_else(|| Arc::new(UreqClient::new(config.max_module_size)));
        let fetcher = Fetcher::new(config.src_dir.clone(), config.max_module_size, client);
        let graph = ModuleGraph::new(
            fetcher,
            store,
            GraphOptions {
                import_map,
                cache_deps: config.cache_deps,
                source_map: config.source_map,
            },
        );
        let locales = load_locales(&config.src_dir.join(LOCALES_DIR));

        let project = Self {
            config,
            production: options.production,
            graph: Mutex::new(graph),
            pages: RwLock::new(Arc::default()),
            app_module: RwLock::new(None),
            locales,
            renderer: options.renderer,
            executor: options.executor,
        };
        project.init()?;
        Ok(project)
    }

    fn init(&self) -> Result<(), ProjectError> {
        let src_dir = &self.config.src_dir;
        let mut graph = self.lock_graph();

        if let Some(app) = find_app_module(src_dir) {
            graph
                .compile(&app, &CompileOptions::default())
                .map_err(|source| ProjectError::Graph {
                    id: app.clone(),
                    source,
                })?;
            *self.app_module.write().unwrap() = Some(app);
        }

        let ids = pages::discover(src_dir).map_err(ProjectError::io(src_dir))?;
        for id in &ids {
            if let Err(err) = graph.compile(id, &CompileOptions::default()) {
                self.recover(id, err)?;
            }
        }

        let stats = graph.stats();
        drop(graph);
        self.refresh_pages()?;

        tracing::info!(
            modules = ids.len(),
            pages = self.page_table().len(),
            compiled = stats.compiled,
            fetched = stats.fetched,
            reused = stats.reused,
            "project ready"
        );
        Ok(())
    }

    fn recover(&self, id: &str, err: GraphError) -> Result<(), ProjectError> {
        if err.is_too_large() {
            tracing::warn!(module = %id, "{err}, skipping");
            return Ok(());
        }
        if self.production && matches!(err, GraphError::Compile(_)) {
            return Err(ProjectError::Graph {
                id: id.to_owned(),
                source: err,
            });
        }
        tracing::error!(module = %id, "{err}");
        Ok(())
    }

    /// Rescan pages and the app module from disk.
    fn refresh_pages(&self) -> Result<(), ProjectError> {
        let src_dir = &self.config.src_dir;
        let ids = pages::discover(src_dir).map_err(ProjectError::io(src_dir))?;
        let table = PageTable::from_ids(ids.iter().map(String::as_str));

        *self.pages.write().unwrap() = Arc::new(table);
        *self.app_module.write().unwrap() = find_app_module(src_dir);
        Ok(())
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Whether the project runs in production mode.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Snapshot of the page table.
    ///
    /// # Panics
    ///
    /// Panics if the page table lock is poisoned.
    #[must_use]
    pub fn page_table(&self) -> Arc<PageTable> {
        Arc::clone(&self.pages.read().unwrap())
    }

    /// Locale dictionaries keyed by locale.
    #[must_use]
    pub fn locales(&self) -> &BTreeMap<String, Value> {
        &self.locales
    }

    /// Route manifest for the client runtime.
    ///
    /// Pages whose module is not compiled are left out.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        let pages = self.page_table();
        let app_id = self.app_module.read().unwrap().clone();
        let graph = self.lock_graph();

        let app_module = app_id
            .and_then(|id| graph.module(&id))
            .map(|m| AppModule { hash: m.hash });
        let page_modules = pages
            .iter()
            .filter_map(|(route, id)| {
                let module = graph.module(id)?;
                Some((
                    route.to_owned(),
                    PageModule {
                        path: id.to_owned(),
                        hash: module.hash,
                    },
                ))
            })
            .collect();

        Manifest {
            base_url: self.config.base_url.clone(),
            default_locale: self.config.default_locale.clone(),
            locales: self.locales.clone(),
            app_module,
            page_modules,
        }
    }

    /// Request path serving `module`: `<baseUrl>/_post/<output name>`.
    #[must_use]
    pub fn module_url(&self, module: &Module) -> String {
        format!("{}{MODULE_PREFIX}{}", self.base_prefix(), module.output_name())
    }

    /// Resolve a request path back to a compiled module.
    ///
    /// Accepts `<baseUrl>/_post/<stem>[.<hash9>].js[.map]`. A local module
    /// requested with a hash that is not its current one is not found.
    ///
    /// # Panics
    ///
    /// Panics if the graph lock is poisoned.
    #[must_use]
    pub fn get_module(&self, request_path: &str) -> Option<ServedModule> {
        let path = request_path.split(['?', '#']).next()?;
        let path = path.strip_prefix(self.base_prefix())?;
        let path = path.strip_prefix(MODULE_PREFIX)?;
        let (path, is_source_map) = match path.strip_suffix(".map") {
            Some(path) => (path, true),
            None => (path, false),
        };
        let name = path.strip_suffix(".js")?;

        let graph = self.lock_graph();
        let module = split_hash(name)
            .and_then(|(stem, prefix)| graph.module_by_output(stem, prefix))
            .or_else(|| graph.module_by_stem(name))?;

        if is_source_map && module.source_map.is_none() {
            return None;
        }
        Some(ServedModule {
            module,
            is_source_map,
        })
    }

    /// Render the page for `location`.
    ///
    /// Returns `(200, html)` for a matched page, `404` for the not-found
    /// page or when nothing matches, and `500` with the error body when the
    /// page fails to compile, execute or render.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn get_page_html(&self, location: &str) -> (u16, String) {
        let (url, page_id) = self.route(location);
        let Some(page_id) = page_id else {
            return (404, self.renderer.render_not_found(&url));
        };
        let status = if url.page_path == NOT_FOUND_ROUTE {
            404
        } else {
            200
        };

        match self.render(&url, &page_id) {
            Ok(html) => (status, html),
            Err(err) => {
                let message = error_chain(&err);
                tracing::error!(page = %page_id, "{message}");
                (500, self.renderer.render_error(&url, &message))
            }
        }
    }

    /// Static props of the page for `location`, if it has any.
    ///
    /// Failures are logged and reported as `None`.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn get_page_static_props(&self, location: &str) -> Option<Value> {
        let (url, page_id) = self.route(location);
        let page_id = page_id?;

        let result = self
            .prepare(&page_id)
            .and_then(|prepared| self.static_props(&url, &prepared));
        match result {
            Ok(props) => props,
            Err(err) => {
                tracing::error!(page = %page_id, "{}", error_chain(&err));
                None
            }
        }
    }

    fn route(&self, location: &str) -> (RouterUrl, Option<String>) {
        let pages = self.page_table();
        let routes = pages.routes();
        let locales: Vec<String> = self.locales.keys().cloned().collect();
        let options = RouteOptions {
            fallback: pages.module_id(NOT_FOUND_ROUTE).map(|_| NOT_FOUND_ROUTE),
            locales: &locales,
            default_locale: &self.config.default_locale,
        };

        let url = router::route(&self.config.base_url, &routes, location, &options);
        let page_id = pages.module_id(&url.page_path).map(str::to_owned);
        (url, page_id)
    }

    fn render(&self, url: &RouterUrl, page_id: &str) -> Result<String, ProjectError> {
        let prepared = self.prepare(page_id)?;
        let props = self.static_props(url, &prepared)?;

        let page_script = self.module_url(&prepared.page);
        let app_script = prepared.app.as_ref().map(|app| self.module_url(app));
        let html = self.renderer.render_page(&PageContext {
            url,
            page_id,
            page_script: &page_script,
            app_script: app_script.as_deref(),
            static_props: props.as_ref(),
        })?;
        Ok(html)
    }

    /// Page and app modules plus the code reachable from the page.
    ///
    /// Development mode recompiles both so edits show up without a watcher.
    fn prepare(&self, page_id: &str) -> Result<PreparedPage, ProjectError> {
        let app_id = self.app_module.read().unwrap().clone();
        let mut graph = self.lock_graph();

        let page = self.current_module(&mut graph, page_id)?;
        let app = app_id
            .map(|id| self.current_module(&mut graph, &id))
            .transpose()?;
        let modules = execution_modules(&graph, &page);
        Ok(PreparedPage { page, app, modules })
    }

    fn current_module(&self, graph: &mut ModuleGraph, id: &str) -> Result<Module, ProjectError> {
        let result = if self.production {
            graph
                .module(id)
                .ok_or_else(|| GraphError::NotFound(id.to_owned()))
        } else {
            graph.compile(id, &CompileOptions::default())
        };
        result.map_err(|source| ProjectError::Graph {
            id: id.to_owned(),
            source,
        })
    }

    fn static_props(
        &self,
        url: &RouterUrl,
        prepared: &PreparedPage,
    ) -> Result<Option<Value>, ProjectError> {
        let bindings = HostBindings::new()
            .with("location", serde_json::to_value(url)?)
            .with("locale", json!(url.locale))
            .with("baseUrl", json!(self.config.base_url));
        let entry = prepared.page.output_name();

        let props = self.executor.static_props(&ExecutionRequest {
            entry: &entry,
            modules: &prepared.modules,
            bindings: &bindings,
        })?;
        Ok(props)
    }

    /// Recompile a changed source file and everything depending on it.
    ///
    /// `path` is absolute or relative to the source directory. Dependents
    /// are visited breadth-first and only while hashes keep changing.
    /// Returns the ids whose compiled hash changed, the changed file first.
    /// A deleted file is dropped from the graph and reported as updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the changed file itself fails to compile or the
    /// page table cannot be rebuilt. Dependent failures are logged.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn handle_file_change(&self, path: &Path) -> Result<Vec<String>, ProjectError> {
        let Some(id) = self.module_id_for(path) else {
            tracing::debug!(path = %path.display(), "ignoring change outside module tree");
            return Ok(Vec::new());
        };

        let mut graph = self.lock_graph();
        let file = self.config.src_dir.join(id.trim_start_matches('/'));
        if !file.is_file() {
            let removed = graph.remove(&id).is_some();
            drop(graph);
            self.refresh_pages()?;
            tracing::info!(module = %id, "module removed");
            return Ok(if removed { vec![id] } else { Vec::new() });
        }

        let before = graph.module(&id).map(|m| m.hash);
        let module = match graph.compile(&id, &CompileOptions::default()) {
            Ok(module) => module,
            Err(err) if err.is_too_large() => {
                tracing::warn!(module = %id, "{err}, skipping");
                return Ok(Vec::new());
            }
            Err(source) => return Err(ProjectError::Graph { id, source }),
        };

        let mut updated = Vec::new();
        if before.as_deref() != Some(module.hash.as_str()) {
            updated.push(id.clone());
            let mut queue: VecDeque<String> = graph.dependents(&id).into();
            let mut seen = HashSet::from([id.clone()]);

            while let Some(dependent) = queue.pop_front() {
                if !seen.insert(dependent.clone()) {
                    continue;
                }
                let before = graph.module(&dependent).map(|m| m.hash);
                match graph.compile(&dependent, &CompileOptions::default()) {
                    Ok(module) if before.as_deref() != Some(module.hash.as_str()) => {
                        tracing::info!(module = %dependent, "dependent updated");
                        queue.extend(graph.dependents(&dependent));
                        updated.push(dependent);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(module = %dependent, "{err}"),
                }
            }
        }
        drop(graph);

        if page_route(&id).is_some() || is_app_module(&id) {
            self.refresh_pages()?;
        }
        Ok(updated)
    }

    /// Module id of a source file, `None` outside the source directory or
    /// for files that are not modules.
    fn module_id_for(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.config.src_dir).ok()?
        } else {
            path
        };

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str()?;
                    if name.starts_with('.') {
                        return None;
                    }
                    segments.push(name);
                }
                Component::CurDir => {}
                _ => return None,
            }
        }

        let id = format!("/{}", segments.join("/"));
        SourceType::from_path(&id).map(|_| id)
    }

    /// Write compiled modules, the manifest and static pages to the output
    /// directory.
    ///
    /// Modules go to `<outputDir>/_post/<output name>` (plus `.map` files),
    /// the manifest to `<outputDir>/manifest.json`. Every static route is
    /// rendered to `<route>/index.html`; `/` and `/404` become `index.html`
    /// and `404.html`. Dynamic routes are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an output file cannot be written.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn build(&self) -> Result<BuildSummary, ProjectError> {
        let output_dir = self.config.output_dir.clone();
        let module_dir = output_dir.join(MODULE_PREFIX.trim_start_matches('/'));

        // Aliases are names cycle members still import each other by
        let outputs: Vec<(String, Module)> = {
            let graph = self.lock_graph();
            graph
                .modules()
                .into_iter()
                .chain(graph.remote_modules())
                .map(|m| (m.output_name(), m))
                .chain(graph.aliases().into_iter().map(|a| (a.output_name(), a.module)))
                .collect()
        };
        for (name, module) in &outputs {
            let path = module_dir.join(name.trim_start_matches('/'));
            write_file(&path, &module.js_content)?;
            if let Some(map) = &module.source_map {
                write_file(&ArtifactStore::source_map_path(&path), map)?;
            }
        }
        let modules = outputs.len();

        let manifest = serde_json::to_string_pretty(&self.manifest())?;
        write_file(&output_dir.join(MANIFEST_FILENAME), &manifest)?;

        let mut pages = 0;
        let mut failed_pages = Vec::new();
        for (route, _) in self.page_table().iter() {
            if is_dynamic(route) {
                tracing::debug!(route, "skipping dynamic route");
                continue;
            }
            let location = format!("{}{route}", self.base_prefix());
            let (status, html) = self.get_page_html(&location);
            if status == 500 {
                failed_pages.push(route.to_owned());
                continue;
            }
            write_file(&output_dir.join(page_file(route)), &html)?;
            pages += 1;
        }

        tracing::info!(
            modules,
            pages,
            output = %output_dir.display(),
            "build finished"
        );
        Ok(BuildSummary {
            output_dir,
            modules,
            pages,
            failed_pages,
        })
    }

    /// Base URL as a request path prefix (`""` for `/`).
    fn base_prefix(&self) -> &str {
        if self.config.base_url == "/" {
            ""
        } else {
            &self.config.base_url
        }
    }

    fn lock_graph(&self) -> MutexGuard<'_, ModuleGraph> {
        self.graph.lock().unwrap()
    }
}

struct PreparedPage {
    page: Module,
    app: Option<Module>,
    modules: BTreeMap<String, String>,
}

/// Compiled code of `entry` and every module it reaches, by output name.
fn execution_modules(graph: &ModuleGraph, entry: &Module) -> BTreeMap<String, String> {
    let mut modules = BTreeMap::new();
    let mut seen = HashSet::from([entry.id.clone()]);
    let mut stack = vec![entry.clone()];

    while let Some(module) = stack.pop() {
        for dep in &module.deps {
            if seen.insert(dep.path.clone())
                && let Some(next) = graph
                    .module(&dep.path)
                    .or_else(|| graph.remote_module(&dep.path))
            {
                stack.push(next);
            }
        }
        modules.insert(module.output_name(), module.js_content);
    }
    modules
}

fn find_app_module(src_dir: &Path) -> Option<String> {
    SourceType::ALL.iter().find_map(|ty| {
        let name = format!("{APP_MODULE_NAME}.{}", ty.extension());
        src_dir.join(&name).is_file().then(|| format!("/{name}"))
    })
}

fn is_app_module(id: &str) -> bool {
    id.strip_prefix('/')
        .and_then(|name| name.strip_prefix(APP_MODULE_NAME))
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|ext| SourceType::from_extension(ext).is_some())
}

/// Load `<locale>.json` dictionaries; unreadable files are logged and skipped.
fn load_locales(dir: &Path) -> BTreeMap<String, Value> {
    let mut locales = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return locales;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(locale) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".json"))
        else {
            continue;
        };

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(dictionary) => {
                locales.insert(locale.to_owned(), dictionary);
            }
            Err(err) => tracing::error!(path = %path.display(), "invalid locale file: {err}"),
        }
    }
    locales
}

/// Split `<stem>.<hash9>` into stem and hash prefix.
fn split_hash(name: &str) -> Option<(&str, &str)> {
    let (stem, hash) = name.rsplit_once('.')?;
    (hash.len() == HASH_PREFIX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit()))
        .then_some((stem, hash))
}

fn page_file(route: &str) -> PathBuf {
    match route {
        "/" => PathBuf::from("index.html"),
        NOT_FOUND_ROUTE => PathBuf::from("404.html"),
        _ => Path::new(route.trim_start_matches('/')).join("index.html"),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ProjectError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ProjectError::io(parent))?;
    }
    fs::write(path, contents).map_err(ProjectError::io(path))
}

/// Error message followed by its sources, one per line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push('\n');
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
