//! The module graph.
//!
//! [`ModuleGraph::compile`] brings one module and, transitively, all of its
//! dependencies up to date:
//!
//! 1. Remote modules already compiled in this process are returned as-is.
//! 2. A missing in-memory record is seeded from `<stem>.meta.json` and the
//!    persisted artifact.
//! 3. Source is obtained from inline text, the project tree or the network.
//!    Remote non-loopback modules with a persisted record are never
//!    re-fetched. A source hash equal to the recorded one skips step 4.
//! 4. Changed sources are compiled; dependency hash slots are pre-filled with
//!    the best known hashes.
//! 5. Every dependency is compiled. When a dependency's hash differs from the
//!    recorded one, the new prefix is written into this module's slots and
//!    its own hash recomputed.
//! 6. Anything that changed is persisted.
//! 7. The record is registered and returned.
//!
//! Each id is compiled at most once per top-level call. Ids reached again
//! (cycles, diamonds) resolve to the record as currently known, so a cycle
//! settles after a single pass: the module entered last references its
//! importer under the hash the importer had before its own slots were
//! filled. Members of a cycle keep importing each other by the name they
//! first recorded, and each name that differs from the current output is
//! written as an [`OutputAlias`] holding the current artifact. Every
//! referenced file exists and recompiling an unchanged cycle is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::mem;
use std::path::PathBuf;

use post_cache::{ArtifactStore, content_hash, hash_prefix};
use post_compiler::specifier::{
    is_loopback, is_remote, module_stem, normalize_local, normalize_remote,
};
use post_compiler::{
    CompileInput, PathRewriter, SourceType, compile as compile_module, fill_slots, slots_valid,
};
use post_config::ImportMap;
use post_fetch::{Fetched, Fetcher, Source};

use crate::{Dependency, GraphError, Module, ModuleMeta, OutputAlias};

/// Cache format version written to `.cache/VERSION`.
pub const CACHE_VERSION: &str = concat!("post-", env!("CARGO_PKG_VERSION"), "-1");

/// Graph-wide compile settings.
#[derive(Clone, Debug, Default)]
pub struct GraphOptions {
    /// Layered import map.
    pub import_map: ImportMap,
    /// Vendor remote dependencies that are not transpilable modules.
    pub cache_deps: bool,
    /// Emit source maps.
    pub source_map: bool,
}

/// Per-call compile options.
#[derive(Clone, Debug, Default)]
pub struct CompileOptions {
    /// Inline source text (synthetic entry modules).
    pub source: Option<String>,
    /// Source type override for inline or fetched source.
    pub source_type: Option<SourceType>,
    /// Compile only this module; leave dependencies untouched.
    pub transpile_only: bool,
}

/// Work counters since the graph was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Modules run through the compiler.
    pub compiled: usize,
    /// Modules and aliases written to the artifact store.
    pub persisted: usize,
    /// Remote sources fetched over the network.
    pub fetched: usize,
    /// Modules whose source was unchanged.
    pub reused: usize,
}

/// State of one top-level [`ModuleGraph::compile`] call.
#[derive(Default)]
struct CompileRun {
    visited: HashSet<String>,
    pending: HashMap<String, Module>,
    /// Ids currently settling their dependencies, outermost first.
    stack: Vec<String>,
    /// Ids found on an import cycle.
    cyclic: HashSet<String>,
}

/// Incremental compile cache over local and remote modules.
pub struct ModuleGraph {
    fetcher: Fetcher,
    store: ArtifactStore,
    options: GraphOptions,
    modules: HashMap<String, Module>,
    remote: HashMap<String, Module>,
    stats: GraphStats,
}

impl ModuleGraph {
    /// Create an empty graph over `store`.
    #[must_use]
    pub fn new(fetcher: Fetcher, store: ArtifactStore, options: GraphOptions) -> Self {
        Self {
            fetcher,
            store,
            options,
            modules: HashMap::new(),
            remote: HashMap::new(),
            stats: GraphStats::default(),
        }
    }

    /// Compile `id` and everything it depends on.
    ///
    /// `id` is a project-relative path (`pages/index.tsx`, `/pages/index.tsx`)
    /// or an absolute `http(s)` URL. Local ids without an extension resolve to
    /// the file they name (`/lib/util` to `/lib/util.ts`). On error, no state
    /// of the failing module changes and nothing is persisted for it.
    pub fn compile(&mut self, id: &str, options: &CompileOptions) -> Result<Module, GraphError> {
        let mut id = normalize_id(id)?;
        if !is_remote(&id) && SourceType::from_path(&id).is_none() {
            id = self.fetcher.canonical_id(&id).unwrap_or(id);
        }

        let mut run = CompileRun::default();
        let module = self.compile_in(&id, options, &mut run)?;
        self.persist_aliases(&run.visited);
        Ok(module)
    }

    fn compile_in(
        &mut self,
        id: &str,
        options: &CompileOptions,
        run: &mut CompileRun,
    ) -> Result<Module, GraphError> {
        if let Some(module) = self.remote.get(id) {
            return Ok(module.clone());
        }
        if !run.visited.insert(id.to_owned()) {
            if let Some(start) = run.stack.iter().position(|entry| entry == id) {
                run.cyclic.extend(run.stack[start..].iter().cloned());
            }
            return run
                .pending
                .get(id)
                .or_else(|| self.modules.get(id))
                .cloned()
                .ok_or_else(|| GraphError::NotFound(id.to_owned()));
        }

        let remote = is_remote(id);
        let record = match self.modules.get(id) {
            Some(module) => Some(module.clone()),
            None => self.load_persisted(id),
        };

        let fetched = self.obtain_source(id, options, record.as_ref())?;
        let (mut module, mut changed) = match (fetched, record) {
            (Fetched::Changed(source), record) => {
                let module = self.transpile(id, source, options, record.as_ref())?;
                (module, true)
            }
            (Fetched::Unchanged, Some(record)) => {
                tracing::debug!(module = %id, "reusing compiled module");
                self.stats.reused += 1;
                (record, false)
            }
            (Fetched::Unchanged, None) => return Err(GraphError::NotFound(id.to_owned())),
        };
        module.is_remote = remote;

        if !options.transpile_only && !module.deps.is_empty() {
            run.pending.insert(id.to_owned(), module.clone());
            run.stack.push(id.to_owned());
            let result = self.settle_deps(&mut module, run);
            run.stack.pop();
            run.pending.remove(id);
            changed |= result?;
        }

        if changed {
            self.persist(&module);
        }

        if remote {
            self.remote.insert(id.to_owned(), module.clone());
        } else {
            self.modules.insert(id.to_owned(), module.clone());
        }
        Ok(module)
    }

    /// Source for `id`, or [`Fetched::Unchanged`] when `record` is current.
    fn obtain_source(
        &mut self,
        id: &str,
        options: &CompileOptions,
        record: Option<&Module>,
    ) -> Result<Fetched, GraphError> {
        let previous = record.map(|m| m.source_hash.as_str());

        if let Some(text) = &options.source {
            let source_type = options.source_type.unwrap_or_default();
            let source = Source::inline(text.clone(), source_type);
            if previous == Some(source.hash.as_str()) {
                return Ok(Fetched::Unchanged);
            }
            return Ok(Fetched::Changed(source));
        }

        let remote = is_remote(id);
        if remote && record.is_some() && !is_loopback(id) {
            return Ok(Fetched::Unchanged);
        }

        let fetched = self.fetcher.load(id, previous)?;
        if remote {
            self.stats.fetched += 1;
        }
        Ok(fetched)
    }

    fn transpile(
        &mut self,
        id: &str,
        source: Source,
        options: &CompileOptions,
        previous: Option<&Module>,
    ) -> Result<Module, GraphError> {
        let source_type = options.source_type.unwrap_or(source.source_type);
        let fetcher = &self.fetcher;
        let resolve = |dep: &str| fetcher.canonical_id(dep);
        let mut rewriter = PathRewriter::new(id, &self.options.import_map, self.options.cache_deps)
            .with_resolver(&resolve);
        let output = compile_module(
            &CompileInput {
                file: id,
                source: &source.text,
                source_type,
                source_map: self.options.source_map,
            },
            &mut rewriter,
        )?;
        self.stats.compiled += 1;
        tracing::info!(module = %id, "compiled");

        let deps: Vec<Dependency> = output
            .deps
            .into_iter()
            .map(|path| {
                let hash = self.known_hash(&path, previous).unwrap_or_default();
                Dependency { path, hash }
            })
            .collect();

        let mut code = output.code;
        let hashes: Vec<&str> = deps.iter().map(|d| d.hash.as_str()).collect();
        fill_slots(&mut code, &output.slots, &hashes);

        let mut module = Module {
            id: id.to_owned(),
            source_type,
            source_hash: source.hash,
            is_remote: is_remote(id),
            hash: content_hash(&code),
            js_content: code,
            source_map: output.map,
            js_file: PathBuf::new(),
            deps,
            slots: output.slots,
        };
        module.js_file = self.artifact_path(&module);
        Ok(module)
    }

    /// Best known output hash of `dep` before it is compiled in this run.
    fn known_hash(&self, dep: &str, previous: Option<&Module>) -> Option<String> {
        self.modules
            .get(dep)
            .or_else(|| self.remote.get(dep))
            .map(|m| m.hash.clone())
            .or_else(|| {
                previous?
                    .deps
                    .iter()
                    .find(|d| d.path == dep)
                    .map(|d| d.hash.clone())
            })
    }

    /// Compile every dependency of `module`, propagating hash changes.
    ///
    /// Returns `true` when any dependency hash changed.
    fn settle_deps(&mut self, module: &mut Module, run: &mut CompileRun) -> Result<bool, GraphError> {
        let mut deps_changed = false;
        for index in 0..module.deps.len() {
            let path = module.deps[index].path.clone();
            let dep = self.compile_in(&path, &CompileOptions::default(), run)?;
            let recorded = &module.deps[index].hash;
            if dep.hash == *recorded {
                continue;
            }
            let in_cycle = run.cyclic.contains(&path) && run.cyclic.contains(&module.id);
            if in_cycle && !recorded.is_empty() {
                tracing::debug!(module = %module.id, dep = %path, "keeping cycle import name");
                continue;
            }
            tracing::debug!(module = %module.id, dep = %path, "dependency hash changed");
            module.deps[index].hash = dep.hash;
            deps_changed = true;
        }

        if deps_changed {
            let hashes: Vec<&str> = module.deps.iter().map(|d| d.hash.as_str()).collect();
            if fill_slots(&mut module.js_content, &module.slots, &hashes) {
                module.hash = content_hash(&module.js_content);
                module.js_file = self.artifact_path(module);
            }
        }
        Ok(deps_changed)
    }

    fn artifact_path(&self, module: &Module) -> PathBuf {
        let hash = (!module.is_remote).then_some(module.hash.as_str());
        self.store.artifact_path(&module.stem(), hash)
    }

    /// Seed a record from the artifact store.
    ///
    /// Missing, corrupt or inconsistent entries are a miss.
    fn load_persisted(&self, id: &str) -> Option<Module> {
        let stem = module_stem(id);
        let meta: ModuleMeta = self.store.read_meta(&stem)?;
        if meta.source_file != id {
            return None;
        }

        let hash = (!meta.is_remote).then_some(meta.hash.as_str());
        let js_file = self.store.artifact_path(&stem, hash);
        let js_content = ArtifactStore::read_text(&js_file)?;
        if content_hash(&js_content) != meta.hash || !slots_valid(&js_content, &meta.slots) {
            tracing::warn!(module = %id, "ignoring inconsistent cached artifact");
            return None;
        }

        let source_map = if self.options.source_map {
            ArtifactStore::read_text(&ArtifactStore::source_map_path(&js_file))
        } else {
            None
        };

        tracing::debug!(module = %id, "loaded cached module");
        Some(Module {
            id: meta.source_file,
            source_type: meta.source_type,
            source_hash: meta.source_hash,
            is_remote: meta.is_remote,
            hash: meta.hash,
            js_content,
            source_map,
            js_file,
            deps: meta.deps,
            slots: meta.slots,
        })
    }

    fn persist(&mut self, module: &Module) {
        let result = self.store.write(
            &module.stem(),
            &module.meta(),
            &module.js_file,
            &module.js_content,
            module.source_map.as_deref(),
        );
        match result {
            Ok(()) => self.stats.persisted += 1,
            Err(e) => tracing::warn!(module = %module.id, "failed to persist module: {e}"),
        }
    }

    /// Write the artifacts of aliases whose module was visited by this run.
    fn persist_aliases(&mut self, visited: &HashSet<String>) {
        for alias in self.aliases() {
            if !visited.contains(&alias.module.id) {
                continue;
            }
            let module = &alias.module;
            let path = self.store.artifact_path(&module.stem(), Some(&alias.prefix));
            if ArtifactStore::read_text(&path).as_deref() == Some(module.js_content.as_str()) {
                continue;
            }
            let result = ArtifactStore::write_artifact(
                &path,
                &module.js_content,
                module.source_map.as_deref(),
            );
            match result {
                Ok(()) => {
                    tracing::debug!(module = %module.id, alias = %alias.output_name(), "persisted alias");
                    self.stats.persisted += 1;
                }
                Err(e) => tracing::warn!(module = %module.id, "failed to persist alias: {e}"),
            }
        }
    }

    /// Snapshot of a local module.
    #[must_use]
    pub fn module(&self, id: &str) -> Option<Module> {
        self.modules.get(id).cloned()
    }

    /// Snapshot of a vendored remote module.
    #[must_use]
    pub fn remote_module(&self, id: &str) -> Option<Module> {
        self.remote.get(id).cloned()
    }

    /// Snapshots of every local module, ordered by id.
    #[must_use]
    pub fn modules(&self) -> Vec<Module> {
        sorted(self.modules.values())
    }

    /// Snapshots of every vendored remote module, ordered by id.
    #[must_use]
    pub fn remote_modules(&self) -> Vec<Module> {
        sorted(self.remote.values())
    }

    /// Find a local or remote module by output stem.
    #[must_use]
    pub fn module_by_stem(&self, stem: &str) -> Option<Module> {
        self.modules
            .values()
            .chain(self.remote.values())
            .find(|m| m.stem() == stem)
            .cloned()
    }

    /// Find the local module served as `<stem>.<prefix>.js`.
    ///
    /// `prefix` is either the module's current hash prefix or the prefix an
    /// importer still references it by (see [`ModuleGraph::aliases`]).
    #[must_use]
    pub fn module_by_output(&self, stem: &str, prefix: &str) -> Option<Module> {
        let module = self.modules.values().find(|m| m.stem() == stem)?;
        let referenced = || {
            self.modules.values().any(|importer| {
                importer.deps.iter().any(|d| {
                    d.path == module.id && !d.hash.is_empty() && hash_prefix(&d.hash) == prefix
                })
            })
        };
        (hash_prefix(&module.hash) == prefix || referenced()).then(|| module.clone())
    }

    /// Output names importers reference that differ from the current output
    /// name of the local module they point at, ordered by name.
    #[must_use]
    pub fn aliases(&self) -> Vec<OutputAlias> {
        let mut aliases = BTreeMap::new();
        for importer in self.modules.values() {
            for dep in &importer.deps {
                let Some(module) = self.modules.get(&dep.path) else {
                    continue;
                };
                if dep.hash.is_empty() || hash_prefix(&dep.hash) == hash_prefix(&module.hash) {
                    continue;
                }
                let alias = OutputAlias {
                    prefix: hash_prefix(&dep.hash).to_owned(),
                    module: module.clone(),
                };
                aliases.entry(alias.output_name()).or_insert(alias);
            }
        }
        aliases.into_values().collect()
    }

    /// Ids of local modules that depend directly on `id`, ordered.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .modules
            .values()
            .filter(|m| m.deps.iter().any(|d| d.path == id))
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop a local module, e.g. after its source file was deleted.
    pub fn remove(&mut self, id: &str) -> Option<Module> {
        self.modules.remove(id)
    }

    /// Work counters.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Reset the work counters.
    pub fn reset_stats(&mut self) -> GraphStats {
        mem::take(&mut self.stats)
    }
}

fn sorted<'a>(modules: impl Iterator<Item = &'a Module>) -> Vec<Module> {
    let mut modules: Vec<Module> = modules.cloned().collect();
    modules.sort_by(|a, b| a.id.cmp(&b.id));
    modules
}

/// Normalize a user-supplied module id.
pub fn normalize_id(id: &str) -> Result<String, GraphError> {
    if is_remote(id) {
        normalize_remote(id).map_err(|_| GraphError::NotFound(id.to_owned()))
    } else {
        Ok(normalize_local(id))
    }
}
