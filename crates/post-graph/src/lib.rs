//! Incremental module graph for Post.
//!
//! [`ModuleGraph`] owns every compiled [`Module`] (local modules and vendored
//! remote modules in separate namespaces), their dependency edges and hashes.
//! It recompiles only what changed, propagates dependency hash changes into
//! importers' content-addressed specifiers, and persists artifacts so a
//! restarted process picks up where the last one stopped.
//!
//! # Example
//!
//! ```ignore
//! use post_graph::{CompileOptions, ModuleGraph};
//!
//! let index = graph.compile("/pages/index.tsx", &CompileOptions::default())?;
//! println!("{} -> {}", index.id, index.output_name());
//! ```

mod error;
mod graph;
mod module;

pub use error::GraphError;
pub use graph::{
    CACHE_VERSION, CompileOptions, GraphOptions, GraphStats, ModuleGraph, normalize_id,
};
pub use module::{Dependency, Module, ModuleMeta, OutputAlias};
