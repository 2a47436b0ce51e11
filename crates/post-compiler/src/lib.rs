//! Module compiler for Post.
//!
//! Turns one TypeScript/JSX/JavaScript module into browser-ready JavaScript
//! whose import specifiers point at content-addressed output files:
//!
//! - [`SourceType`]: source language detection (extension, `Content-Type`)
//! - [`specifier`]: module ids, output stems and relative specifiers
//! - [`PathRewriter`]: import map application and dependency recording
//! - [`compile`]: the oxc pipeline, producing [`CompiledOutput`] with
//!   [`HashSlot`]s for dependency hashes that are not known yet
//!
//! # Example
//!
//! ```
//! use post_compiler::{CompileInput, PathRewriter, SourceType, compile};
//! use post_config::ImportMap;
//!
//! let import_map = ImportMap::default();
//! let mut rewriter = PathRewriter::new("/pages/index.ts", &import_map, true);
//! let output = compile(
//!     &CompileInput {
//!         file: "/pages/index.ts",
//!         source: "import { nav } from '../components/nav.ts';\nexport const page: string = nav;\n",
//!         source_type: SourceType::Ts,
//!         source_map: false,
//!     },
//!     &mut rewriter,
//! )
//! .unwrap();
//!
//! assert_eq!(output.deps, ["/components/nav.ts"]);
//! assert!(output.code.contains("./../components/nav.000000000.js"));
//! ```

mod rewriter;
mod source_type;
pub mod specifier;
mod transform;

pub use rewriter::{LocalResolver, PathRewriter, Rewrite, RewriteError};
pub use source_type::SourceType;
pub use transform::{
    CompileError, CompileInput, CompiledOutput, HashSlot, compile, fill_slots, slots_valid,
};
