//! Project orchestration for Post.
//!
//! This crate provides:
//! - [`Project`]: opens a project, compiles its modules and serves them
//! - [`route`]: location to page matching with `$param` and `*rest` segments
//! - [`Manifest`]: route manifest consumed by the client runtime
//! - [`PageRenderer`] and [`ModuleExecutor`]: seams for HTML rendering and
//!   static props evaluation
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::Path;
//! use post_site::{Project, ProjectOptions};
//!
//! let project = Project::open(Path::new("."), ProjectOptions::default())?;
//!
//! let (status, html) = project.get_page_html("/");
//! println!("{status}: {} bytes", html.len());
//!
//! let summary = project.build()?;
//! println!("{} modules written", summary.modules);
//! # Ok(())
//! # }
//! ```

mod error;
mod manifest;
pub mod pages;
mod project;
mod render;
mod router;

pub use error::ProjectError;
pub use manifest::{AppModule, Manifest, PageModule};
pub use pages::PageTable;
pub use project::{
    BuildSummary, MANIFEST_FILENAME, MODULE_PREFIX, NOT_FOUND_ROUTE, Project, ProjectOptions,
    ServedModule,
};
pub use render::{
    ExecutionRequest, HostBindings, ModuleExecutor, NoopExecutor, PageContext, PageRenderer,
    RenderError, ShellRenderer, escape_html,
};
pub use router::{RouteOptions, RouterUrl, is_dynamic, route};
