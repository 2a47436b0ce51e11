//! Module graph scenarios over a real project tree and a mock HTTP client.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use post_cache::{ArtifactStore, hash_prefix};
use post_config::ImportMap;
use post_fetch::{Fetcher, HttpResponse, MockHttpClient};
use post_graph::{CACHE_VERSION, CompileOptions, GraphOptions, GraphStats, ModuleGraph};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const REACT: &str = "https://esm.sh/react@17.0.1";

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn graph_with(
    root: &Path,
    client: &Arc<MockHttpClient>,
    limit: u64,
    import_map: ImportMap,
) -> ModuleGraph {
    let fetcher = Fetcher::new(root.to_path_buf(), limit, Arc::clone(client) as _);
    let store = ArtifactStore::open(root.join(".cache"), CACHE_VERSION);
    ModuleGraph::new(
        fetcher,
        store,
        GraphOptions {
            import_map,
            cache_deps: true,
            source_map: false,
        },
    )
}

fn graph(root: &Path, client: &Arc<MockHttpClient>) -> ModuleGraph {
    graph_with(root, client, 1024 * 1024, ImportMap::builtin())
}

fn index_and_nav(root: &Path) {
    write(
        root,
        "pages/index.tsx",
        "import Nav from '../components/nav.tsx';\n\
         export default function Index() { return Nav(); }\n",
    );
    write(
        root,
        "components/nav.tsx",
        "export default function Nav() { return 'v1'; }\n",
    );
}

fn compile(graph: &mut ModuleGraph, id: &str) -> post_graph::Module {
    graph.compile(id, &CompileOptions::default()).unwrap()
}

/// Every local import in every compiled module names a file in the cache.
fn assert_referenced_artifacts_exist(root: &Path, graph: &ModuleGraph) {
    for module in graph.modules() {
        for dep in module.deps.iter().filter(|d| !d.path.starts_with("http")) {
            let target = graph.module(&dep.path).unwrap();
            let name = format!(
                "{}.{}.js",
                target.stem().trim_start_matches('/'),
                hash_prefix(&dep.hash)
            );
            assert!(
                root.join(".cache").join(&name).is_file(),
                "{} imports missing {name}",
                module.id
            );
        }
    }
}

#[test]
fn test_unchanged_recompile_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let first = compile(&mut graph, "/pages/index.tsx");
    assert_eq!(
        graph.reset_stats(),
        GraphStats {
            compiled: 2,
            persisted: 2,
            fetched: 0,
            reused: 0,
        }
    );

    let second = compile(&mut graph, "/pages/index.tsx");
    assert_eq!(first, second);
    assert_eq!(
        graph.stats(),
        GraphStats {
            compiled: 0,
            persisted: 0,
            fetched: 0,
            reused: 2,
        }
    );
}

#[test]
fn test_dependency_change_propagates_to_importer() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let index1 = compile(&mut graph, "/pages/index.tsx");
    let nav1 = graph.module("/components/nav.tsx").unwrap();
    let spec1 = format!("./../components/nav.{}.js", hash_prefix(&nav1.hash));
    assert!(index1.js_content.contains(&spec1));
    assert_eq!(index1.deps[0].hash, nav1.hash);

    write(
        tmp.path(),
        "components/nav.tsx",
        "export default function Nav() { return 'v2'; }\n",
    );
    let index2 = compile(&mut graph, "/pages/index.tsx");
    let nav2 = graph.module("/components/nav.tsx").unwrap();

    assert_ne!(nav1.hash, nav2.hash);
    assert_ne!(index1.hash, index2.hash);
    assert_eq!(index1.source_hash, index2.source_hash);
    let spec2 = format!("./../components/nav.{}.js", hash_prefix(&nav2.hash));
    assert!(index2.js_content.contains(&spec2));
    assert!(!index2.js_content.contains(&spec1));

    // Both generations stay on disk
    assert!(index1.js_file.is_file());
    assert!(index2.js_file.is_file());
    assert_eq!(fs::read_to_string(&index2.js_file).unwrap(), index2.js_content);
}

#[test]
fn test_remote_module_fetched_once() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "pages/index.tsx",
        "import React from 'react';\nexport default function Index() { return <p />; }\n",
    );
    write(
        tmp.path(),
        "pages/about.tsx",
        "import React from 'react';\nexport default function About() { return <p />; }\n",
    );
    let client = Arc::new(MockHttpClient::new().with_module(REACT, "export default {};\n"));
    let mut graph = graph(tmp.path(), &client);

    compile(&mut graph, "/pages/index.tsx");
    compile(&mut graph, "/pages/about.tsx");
    let react = compile(&mut graph, REACT);

    assert_eq!(client.request_count(REACT), 1);
    assert!(react.is_remote);
    assert_eq!(react.output_name(), "/-/esm.sh/react@17.0.1.js");
    assert!(graph.module(REACT).is_none());
    assert!(graph.remote_module(REACT).is_some());
}

#[test]
fn test_nested_remote_imports_are_vendored() {
    let tmp = TempDir::new().unwrap();
    let entry = "https://cdn.example.com/lib/a.js";
    let client = Arc::new(
        MockHttpClient::new()
            .with_module(entry, "export * from './b.js';\nexport * from '/shared/c.js';\n")
            .with_module("https://cdn.example.com/lib/b.js", "export const b = 1;\n")
            .with_module("https://cdn.example.com/shared/c.js", "export const c = 1;\n"),
    );
    let mut graph = graph(tmp.path(), &client);

    let a = compile(&mut graph, entry);

    assert!(a.js_content.contains("\"./b.js\""));
    assert!(a.js_content.contains("\"./../shared/c.js\""));
    assert!(a.slots.is_empty());
    assert_eq!(graph.remote_modules().len(), 3);
    assert!(
        tmp.path()
            .join(".cache/-/cdn.example.com/shared/c.js")
            .is_file()
    );
}

#[test]
fn test_oversized_file_is_skipped() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "pages/big.js", &"x".repeat(2048));
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph_with(tmp.path(), &client, 1024, ImportMap::default());

    let err = graph
        .compile("/pages/big.js", &CompileOptions::default())
        .unwrap_err();

    assert!(err.is_too_large());
    assert!(graph.module("/pages/big.js").is_none());
    assert!(graph.modules().is_empty());
}

#[test]
fn test_project_import_map_wins_over_env() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "import_map.json",
        r#"{"imports": {"lib": "/vendor/lib.ts"}}"#,
    );
    write(tmp.path(), "vendor/lib.ts", "export const lib: string = 'local';\n");
    write(
        tmp.path(),
        "pages/index.ts",
        "import { lib } from 'lib';\nexport default lib;\n",
    );
    let env = r#"{"imports": {"lib": "https://env.example.com/lib.js"}}"#;
    let import_map = ImportMap::load_with_env(tmp.path(), Some(env)).unwrap();
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph_with(tmp.path(), &client, 1024 * 1024, import_map);

    let index = compile(&mut graph, "/pages/index.ts");
    let lib = graph.module("/vendor/lib.ts").unwrap();

    assert_eq!(index.deps[0].path, "/vendor/lib.ts");
    assert!(
        index
            .js_content
            .contains(&format!("./../vendor/lib.{}.js", hash_prefix(&lib.hash)))
    );
    assert_eq!(client.total_requests(), 0);
}

#[test]
fn test_restart_reloads_persisted_modules() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());

    let before = compile(&mut graph(tmp.path(), &client), "/pages/index.tsx");

    let mut restarted = graph(tmp.path(), &client);
    let after = compile(&mut restarted, "/pages/index.tsx");

    assert_eq!(after.hash, before.hash);
    assert_eq!(after.deps, before.deps);
    assert_eq!(after.js_content, before.js_content);
    assert_eq!(restarted.stats().compiled, 0);
    assert_eq!(restarted.stats().persisted, 0);
}

#[test]
fn test_restart_after_edit_recompiles_only_changed() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let before = compile(&mut graph(tmp.path(), &client), "/pages/index.tsx");

    write(
        tmp.path(),
        "components/nav.tsx",
        "export default function Nav() { return 'v2'; }\n",
    );
    let mut restarted = graph(tmp.path(), &client);
    let after = compile(&mut restarted, "/pages/index.tsx");

    assert_ne!(after.hash, before.hash);
    assert_eq!(restarted.stats().compiled, 1);
    assert_eq!(restarted.stats().persisted, 2);
}

#[test]
fn test_restart_reuses_remote_without_fetch() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "pages/index.tsx",
        "import React from 'react';\nexport default function Index() { return <p />; }\n",
    );
    let client = Arc::new(MockHttpClient::new().with_module(REACT, "export default {};\n"));
    compile(&mut graph(tmp.path(), &client), "/pages/index.tsx");

    let offline = Arc::new(MockHttpClient::new());
    let mut restarted = graph(tmp.path(), &offline);
    compile(&mut restarted, "/pages/index.tsx");

    assert_eq!(offline.total_requests(), 0);
    assert!(restarted.remote_module(REACT).is_some());
}

#[test]
fn test_loopback_remote_is_refetched_and_compared() {
    let tmp = TempDir::new().unwrap();
    let url = "http://localhost:4507/mod.ts";
    let client = Arc::new(MockHttpClient::new().with_module(url, "export const v = 1;\n"));
    let first = compile(&mut graph(tmp.path(), &client), url);

    let mut restarted = graph(tmp.path(), &client);
    let same = compile(&mut restarted, url);
    assert_eq!(client.request_count(url), 2);
    assert_eq!(same.hash, first.hash);
    assert_eq!(restarted.stats().compiled, 0);

    client.set_response(
        url,
        HttpResponse {
            status: 200,
            content_type: Some("application/typescript".to_owned()),
            body: b"export const v: number = 2;\n".to_vec(),
        },
    );
    let mut restarted = graph(tmp.path(), &client);
    let changed = compile(&mut restarted, url);
    assert_ne!(changed.hash, first.hash);
    assert_eq!(restarted.stats().compiled, 1);
}

#[test]
fn test_cyclic_imports_terminate() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "lib/a.ts",
        "import { b } from './b.ts';\nexport const a = () => b;\n",
    );
    write(
        tmp.path(),
        "lib/b.ts",
        "import { a } from './a.ts';\nexport const b = () => a;\n",
    );
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let a = compile(&mut graph, "/lib/a.ts");
    let b = graph.module("/lib/b.ts").unwrap();

    assert_eq!(a.deps[0].hash, b.hash);
    assert!(a.js_content.contains(&format!("./b.{}.js", hash_prefix(&b.hash))));
    assert_eq!(graph.dependents("/lib/a.ts"), ["/lib/b.ts"]);
    assert_eq!(graph.dependents("/lib/b.ts"), ["/lib/a.ts"]);

    // B was settled while A was still pending; the name it imports A by
    // must still resolve to A
    let back_edge = hash_prefix(&b.deps[0].hash);
    assert!(b.js_content.contains(&format!("./a.{back_edge}.js")));
    assert!(
        tmp.path()
            .join(format!(".cache/lib/a.{back_edge}.js"))
            .is_file()
    );
    assert_eq!(
        graph.module_by_output("/lib/a", back_edge).map(|m| m.id),
        Some("/lib/a.ts".to_owned())
    );
    assert_referenced_artifacts_exist(tmp.path(), &graph);

    // Recompiling from either end is a no-op
    assert_eq!(compile(&mut graph, "/lib/a.ts"), a);
    assert_eq!(compile(&mut graph, "/lib/b.ts"), b);
    assert_eq!(graph.modules().len(), 2);
    assert_referenced_artifacts_exist(tmp.path(), &graph);
}

#[test]
fn test_cycle_member_change_keeps_names_resolvable() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "lib/a.ts",
        "import { b } from './b.ts';\nexport const a = () => b;\n",
    );
    write(
        tmp.path(),
        "lib/b.ts",
        "import { a } from './a.ts';\nexport const b = () => a;\n",
    );
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);
    compile(&mut graph, "/lib/a.ts");

    write(
        tmp.path(),
        "lib/b.ts",
        "import { a } from './a.ts';\nexport const b = () => [a];\n",
    );
    let b = compile(&mut graph, "/lib/b.ts");
    assert!(b.js_content.contains("[a]"));
    assert_referenced_artifacts_exist(tmp.path(), &graph);

    // A still imports B by its old name, which now serves the new code
    let a = graph.module("/lib/a.ts").unwrap();
    let name = hash_prefix(&a.deps[0].hash);
    let served = graph.module_by_output("/lib/b", name).unwrap();
    assert_eq!(served.js_content, b.js_content);
    assert_eq!(
        fs::read_to_string(tmp.path().join(format!(".cache/lib/b.{name}.js"))).unwrap(),
        b.js_content
    );
}

#[test]
fn test_cycle_alias_survives_restart() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "lib/a.ts",
        "import { b } from './b.ts';\nexport const a = () => b;\n",
    );
    write(
        tmp.path(),
        "lib/b.ts",
        "import { a } from './a.ts';\nexport const b = () => a;\n",
    );
    let client = Arc::new(MockHttpClient::new());
    compile(&mut graph(tmp.path(), &client), "/lib/a.ts");

    let mut restarted = graph(tmp.path(), &client);
    compile(&mut restarted, "/lib/a.ts");
    assert_eq!(restarted.stats().compiled, 0);
    assert_referenced_artifacts_exist(tmp.path(), &restarted);
    for alias in restarted.aliases() {
        assert_eq!(
            restarted
                .module_by_output(&alias.module.stem(), &alias.prefix)
                .map(|m| m.id),
            Some(alias.module.id.clone())
        );
    }
}

#[test]
fn test_extensionless_import_shares_module_id() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "pages/index.tsx",
        "import { greet } from '../lib/util';\nexport default () => greet();\n",
    );
    write(
        tmp.path(),
        "pages/about.tsx",
        "import { greet } from '../lib/util.ts';\nexport default () => greet();\n",
    );
    write(
        tmp.path(),
        "lib/util.ts",
        "export const greet = () => 'hi';\n",
    );
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let index = compile(&mut graph, "/pages/index.tsx");
    let about = compile(&mut graph, "/pages/about.tsx");

    assert_eq!(index.deps[0].path, "/lib/util.ts");
    assert_eq!(about.deps[0].path, "/lib/util.ts");
    assert_eq!(graph.modules().len(), 3);
    assert_eq!(
        graph.dependents("/lib/util.ts"),
        ["/pages/about.tsx", "/pages/index.tsx"]
    );

    // Top-level ids resolve the same way
    let util = compile(&mut graph, "lib/util");
    assert_eq!(util.id, "/lib/util.ts");
    assert_eq!(graph.modules().len(), 3);
}

#[test]
fn test_compile_error_keeps_previous_state() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);
    let good = compile(&mut graph, "/components/nav.tsx");
    let meta_path = tmp.path().join(".cache/components/nav.meta.json");
    let meta_before = fs::read_to_string(&meta_path).unwrap();

    write(tmp.path(), "components/nav.tsx", "export default function (\n");
    let err = graph
        .compile("/components/nav.tsx", &CompileOptions::default())
        .unwrap_err();

    assert!(matches!(err, post_graph::GraphError::Compile(_)));
    assert_eq!(graph.module("/components/nav.tsx").unwrap(), good);
    assert_eq!(fs::read_to_string(&meta_path).unwrap(), meta_before);
}

#[test]
fn test_transpile_only_leaves_deps_alone() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let index = graph
        .compile(
            "/pages/index.tsx",
            &CompileOptions {
                transpile_only: true,
                ..CompileOptions::default()
            },
        )
        .unwrap();

    assert_eq!(index.deps.len(), 1);
    assert!(graph.module("/components/nav.tsx").is_none());
}

#[test]
fn test_missing_remote_is_fetch_error() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "pages/index.ts",
        "export * from 'https://esm.sh/missing.js';\n",
    );
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);

    let err = graph
        .compile("/pages/index.ts", &CompileOptions::default())
        .unwrap_err();

    assert!(err.is_fetch());
    assert!(graph.module("/pages/index.ts").is_none());
}

#[test]
fn test_inline_source_module() {
    let tmp = TempDir::new().unwrap();
    index_and_nav(tmp.path());
    let client = Arc::new(MockHttpClient::new());
    let mut graph = graph(tmp.path(), &client);
    let options = CompileOptions {
        source: Some("import Nav from './components/nav.tsx';\nexport { Nav };\n".to_owned()),
        source_type: Some(post_compiler::SourceType::Ts),
        transpile_only: false,
    };

    let entry = graph.compile("/_bootstrap.ts", &options).unwrap();
    assert_eq!(entry.deps[0].path, "/components/nav.tsx");

    graph.reset_stats();
    graph.compile("/_bootstrap.ts", &options).unwrap();
    assert_eq!(graph.stats().compiled, 0);
}
