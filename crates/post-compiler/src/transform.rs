//! Per-module compilation.
//!
//! Pipeline: parse, semantic analysis, TypeScript/JSX lowering, specifier
//! rewriting over the lowered AST, then code generation. The rewrite runs
//! after lowering so imports that only carried types have already been
//! elided and never become dependency edges.
//!
//! Local dependencies of local modules are content addressed, but their
//! hashes are unknown while this module compiles. Each such specifier gets a
//! fixed-width marker in place of the hash prefix; after codegen the markers
//! are located, recorded as [`HashSlot`]s and blanked to `000000000`. The
//! module graph later writes real prefixes into those byte ranges.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportAllDeclaration, ExportNamedDeclaration, Expression, ImportDeclaration, ImportExpression,
    StringLiteral,
};
use oxc_ast_visit::{VisitMut, walk_mut};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_transformer::{JsxOptions, JsxRuntime, TransformOptions, Transformer};
use post_cache::HASH_PREFIX_LEN;
use serde::{Deserialize, Serialize};

use crate::SourceType;
use crate::rewriter::{PathRewriter, Rewrite};

/// Largest dependency index a marker can encode.
const MAX_SLOT_DEPS: usize = 999_999;

/// Byte range in compiled output that holds a dependency's hash prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashSlot {
    /// Index of the dependency in the module's dependency list.
    pub dep: usize,
    /// Byte offset of the first prefix character.
    pub offset: usize,
}

/// Input for [`compile`].
#[derive(Clone, Copy, Debug)]
pub struct CompileInput<'s> {
    /// Module id, used in diagnostics and as the source map source name.
    pub file: &'s str,
    /// Raw source text.
    pub source: &'s str,
    /// Source language.
    pub source_type: SourceType,
    /// Emit a source map.
    pub source_map: bool,
}

/// Output of a successful compile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledOutput {
    /// Generated JavaScript, hash slots blanked.
    pub code: String,
    /// Source map JSON, if requested.
    pub map: Option<String>,
    /// Dependency module ids in first-occurrence order.
    pub deps: Vec<String>,
    /// Hash slots in ascending offset order.
    pub slots: Vec<HashSlot>,
}

/// Compilation failure carrying every diagnostic reported for the module.
#[derive(Debug, thiserror::Error)]
#[error("failed to compile {file}:\n  {}", .diagnostics.join("\n  "))]
pub struct CompileError {
    /// Module id.
    pub file: String,
    /// Parser, transformer and specifier diagnostics.
    pub diagnostics: Vec<String>,
}

impl CompileError {
    fn new(file: &str, diagnostics: Vec<String>) -> Self {
        Self {
            file: file.to_owned(),
            diagnostics,
        }
    }
}

/// Compile one module, rewriting its specifiers through `rewriter`.
///
/// Either every stage succeeds or a [`CompileError`] aggregating all
/// diagnostics is returned; there is no partial output.
pub fn compile(
    input: &CompileInput<'_>,
    rewriter: &mut PathRewriter<'_>,
) -> Result<CompiledOutput, CompileError> {
    let file = input.file;
    let marker = SlotMarker::avoiding(&[input.source]).ok_or_else(|| no_marker(file))?;
    let mut emitted = emit(input, rewriter, &marker)?;

    let marker = if marker.occurrences(&emitted.code) == emitted.markers {
        marker
    } else {
        // Escapes in string literals are printed decoded and can spell the marker.
        let retry =
            SlotMarker::avoiding(&[input.source, &emitted.code]).ok_or_else(|| no_marker(file))?;
        emitted = emit(input, rewriter, &retry)?;
        if retry.occurrences(&emitted.code) != emitted.markers {
            return Err(no_marker(file));
        }
        retry
    };

    let Emitted { mut code, map, .. } = emitted;
    let slots = marker.extract(&mut code);

    tracing::debug!(module = %file, deps = rewriter.deps().len(), "compiled module");

    Ok(CompiledOutput {
        code,
        map,
        deps: rewriter.deps().to_vec(),
        slots,
    })
}

/// Generated code before hash slots are extracted.
struct Emitted {
    code: String,
    map: Option<String>,
    /// Markers written into specifiers.
    markers: usize,
}

fn emit(
    input: &CompileInput<'_>,
    rewriter: &mut PathRewriter<'_>,
    marker: &SlotMarker,
) -> Result<Emitted, CompileError> {
    let file = input.file;
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, input.source, input.source_type.to_oxc()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        let diagnostics = parsed.errors.iter().map(ToString::to_string).collect();
        return Err(CompileError::new(file, diagnostics));
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_scoping();
    let options = TransformOptions {
        jsx: JsxOptions {
            runtime: JsxRuntime::Classic,
            ..JsxOptions::default()
        },
        ..TransformOptions::default()
    };
    let transformed =
        Transformer::new(&allocator, Path::new(file), &options).build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        let diagnostics = transformed.errors.iter().map(ToString::to_string).collect();
        return Err(CompileError::new(file, diagnostics));
    }

    let mut visitor = SpecifierVisitor {
        allocator: &allocator,
        rewriter,
        marker,
        markers: 0,
        errors: Vec::new(),
    };
    visitor.visit_program(&mut program);
    if !visitor.errors.is_empty() {
        return Err(CompileError::new(file, visitor.errors));
    }
    let markers = visitor.markers;

    let codegen_options = CodegenOptions {
        source_map_path: input.source_map.then(|| Path::new(file).to_path_buf()),
        ..CodegenOptions::default()
    };
    let generated = Codegen::new().with_options(codegen_options).build(&program);

    Ok(Emitted {
        code: generated.code,
        map: generated.map.map(|map| map.to_json_string()),
        markers,
    })
}

fn no_marker(file: &str) -> CompileError {
    CompileError::new(
        file,
        vec!["no free hash slot marker for this source".to_owned()],
    )
}

/// Overwrite every hash slot with the prefix of its dependency's hash.
///
/// Slots whose dependency has no hash yet keep their current bytes. Returns
/// `true` when `code` changed.
pub fn fill_slots(code: &mut String, slots: &[HashSlot], dep_hashes: &[&str]) -> bool {
    let mut changed = false;
    for slot in slots {
        let Some(hash) = dep_hashes.get(slot.dep).filter(|h| h.len() >= HASH_PREFIX_LEN) else {
            continue;
        };
        let prefix = &hash[..HASH_PREFIX_LEN];
        let range = slot.offset..slot.offset + HASH_PREFIX_LEN;
        if code.get(range.clone()).is_some_and(|current| current != prefix) {
            code.replace_range(range, prefix);
            changed = true;
        }
    }
    changed
}

/// Check that every slot lies on an ASCII run of the expected width.
#[must_use]
pub fn slots_valid(code: &str, slots: &[HashSlot]) -> bool {
    slots.iter().all(|slot| {
        code.get(slot.offset..slot.offset + HASH_PREFIX_LEN)
            .is_some_and(|s| s.bytes().all(|b| b.is_ascii_alphanumeric()))
    })
}

/// Placeholder token written where a hash prefix belongs.
///
/// Tokens are `_<salt>$<6-digit dep index>`, exactly [`HASH_PREFIX_LEN`]
/// bytes, with a salt chosen so that `_<salt>$` occurs in none of the given
/// texts. The generated code must contain the lead only inside tokens.
struct SlotMarker {
    lead: String,
}

impl SlotMarker {
    fn avoiding(texts: &[&str]) -> Option<Self> {
        ('a'..='z')
            .chain('A'..='Z')
            .map(|salt| format!("_{salt}$"))
            .find(|lead| texts.iter().all(|text| !text.contains(lead.as_str())))
            .map(|lead| Self { lead })
    }

    fn occurrences(&self, code: &str) -> usize {
        code.matches(self.lead.as_str()).count()
    }

    fn token(&self, dep: usize) -> String {
        format!("{}{dep:06}", self.lead)
    }

    fn extract(&self, code: &mut String) -> Vec<HashSlot> {
        let digits = HASH_PREFIX_LEN - self.lead.len();
        let slots: Vec<HashSlot> = code
            .match_indices(self.lead.as_str())
            .filter_map(|(offset, _)| {
                let start = offset + self.lead.len();
                let index = code.get(start..start + digits)?;
                if !index.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                Some(HashSlot {
                    dep: index.parse().ok()?,
                    offset,
                })
            })
            .collect();

        let blank = "0".repeat(HASH_PREFIX_LEN);
        for slot in &slots {
            code.replace_range(slot.offset..slot.offset + HASH_PREFIX_LEN, &blank);
        }
        slots
    }
}

struct SpecifierVisitor<'a, 'v, 'm> {
    allocator: &'a Allocator,
    rewriter: &'v mut PathRewriter<'m>,
    marker: &'v SlotMarker,
    markers: usize,
    errors: Vec<String>,
}

impl<'a> SpecifierVisitor<'a, '_, '_> {
    fn rewrite_literal(&mut self, literal: &mut StringLiteral<'a>) {
        let rewritten = match self.rewriter.rewrite(literal.value.as_str()) {
            Ok(Rewrite::Passthrough(specifier)) => specifier,
            Ok(Rewrite::Dependency { index, path, hashed }) if hashed => {
                if index > MAX_SLOT_DEPS {
                    self.errors.push(format!("too many dependencies ({index})"));
                    return;
                }
                self.markers += 1;
                format!("{path}.{}.js", self.marker.token(index))
            }
            Ok(Rewrite::Dependency { path, .. }) => format!("{path}.js"),
            Err(e) => {
                self.errors.push(e.to_string());
                return;
            }
        };

        if rewritten != literal.value.as_str() {
            literal.value = self.allocator.alloc_str(&rewritten).into();
            literal.raw = None;
        }
    }
}

impl<'a> VisitMut<'a> for SpecifierVisitor<'a, '_, '_> {
    fn visit_import_declaration(&mut self, decl: &mut ImportDeclaration<'a>) {
        self.rewrite_literal(&mut decl.source);
    }

    fn visit_export_all_declaration(&mut self, decl: &mut ExportAllDeclaration<'a>) {
        self.rewrite_literal(&mut decl.source);
    }

    fn visit_export_named_declaration(&mut self, decl: &mut ExportNamedDeclaration<'a>) {
        if let Some(source) = &mut decl.source {
            self.rewrite_literal(source);
        }
        walk_mut::walk_export_named_declaration(self, decl);
    }

    fn visit_import_expression(&mut self, expr: &mut ImportExpression<'a>) {
        if let Expression::StringLiteral(literal) = &mut expr.source {
            self.rewrite_literal(literal);
        }
        walk_mut::walk_import_expression(self, expr);
    }
}

#[cfg(test)]
mod tests {
    use post_config::ImportMap;
    use pretty_assertions::assert_eq;

    use super::*;

    fn compile_str(file: &str, source: &str, source_type: SourceType) -> CompiledOutput {
        let map = ImportMap::builtin();
        let mut rewriter = PathRewriter::new(file, &map, true);
        compile(
            &CompileInput {
                file,
                source,
                source_type,
                source_map: false,
            },
            &mut rewriter,
        )
        .unwrap()
    }

    #[test]
    fn test_compile_tsx_lowers_types_and_jsx() {
        let out = compile_str(
            "/pages/index.tsx",
            "import React from 'react';\n\
             interface Props { name: string }\n\
             export default function Page({ name }: Props) { return <h1>{name}</h1>; }\n",
            SourceType::Tsx,
        );

        assert!(out.code.contains("React.createElement"));
        assert!(!out.code.contains("interface"));
        assert!(out.code.contains("./../-/esm.sh/react@17.0.1.js"));
        assert_eq!(out.deps, ["https://esm.sh/react@17.0.1"]);
        assert!(out.slots.is_empty());
    }

    #[test]
    fn test_local_import_gets_blank_slot() {
        let out = compile_str(
            "/pages/index.tsx",
            "import Nav from '../components/nav.tsx';\nexport default Nav;\n",
            SourceType::Tsx,
        );

        assert_eq!(out.deps, ["/components/nav.tsx"]);
        assert_eq!(out.slots.len(), 1);
        assert!(out.code.contains("./../components/nav.000000000.js"));

        let slot = out.slots[0];
        assert_eq!(slot.dep, 0);
        assert_eq!(&out.code[slot.offset..slot.offset + HASH_PREFIX_LEN], "000000000");
    }

    #[test]
    fn test_reexports_and_dynamic_imports() {
        let out = compile_str(
            "/lib/index.ts",
            "export * from './a.ts';\n\
             export { b } from './b.ts';\n\
             export const load = () => import('./c.ts');\n",
            SourceType::Ts,
        );

        assert_eq!(out.deps, ["/lib/a.ts", "/lib/b.ts", "/lib/c.ts"]);
        assert_eq!(out.slots.len(), 3);
        assert!(out.code.contains("./a.000000000.js"));
        assert!(out.code.contains("./b.000000000.js"));
        assert!(out.code.contains("./c.000000000.js"));
    }

    #[test]
    fn test_type_only_import_is_not_a_dependency() {
        let out = compile_str(
            "/pages/index.tsx",
            "import type { Props } from './types.ts';\nexport const x: Props | null = null;\n",
            SourceType::Tsx,
        );
        assert!(out.deps.is_empty());
    }

    #[test]
    fn test_fill_slots() {
        let mut out = compile_str(
            "/pages/index.tsx",
            "import a from './a.ts';\nimport b from './b.ts';\nexport { a, b };\n",
            SourceType::Ts,
        );

        let hashes = ["aaaaaaaaa1111", "bbbbbbbbb2222"];
        assert!(fill_slots(&mut out.code, &out.slots, &hashes));
        assert!(out.code.contains("./a.aaaaaaaaa.js"));
        assert!(out.code.contains("./b.bbbbbbbbb.js"));
        assert!(slots_valid(&out.code, &out.slots));

        // Same hashes again: nothing to do
        assert!(!fill_slots(&mut out.code, &out.slots, &hashes));
    }

    #[test]
    fn test_marker_avoids_source_collisions() {
        let source = "export const s = '_a$000000 _b$';\n";
        let out = compile_str("/x.ts", source, SourceType::Ts);
        assert!(out.code.contains("_a$000000 _b$"));
        assert!(out.slots.is_empty());
    }

    #[test]
    fn test_escaped_marker_lookalike_keeps_literal() {
        let source = "import y from './y.ts';\n\
                      export const x = \"\\x5fa$000000\";\n\
                      console.log(x, y);\n";
        let out = compile_str("/lib/x.ts", source, SourceType::Ts);

        assert_eq!(out.deps, ["/lib/y.ts"]);
        assert_eq!(out.slots.len(), 1);
        let slot = out.slots[0];
        assert_eq!(&out.code[slot.offset - 4..slot.offset], "./y.");
        // Only the specifier was blanked; the string literal survives
        assert_eq!(out.code.matches("000000000").count(), 1);
        assert!(out.code.contains("a$000000"));
    }

    #[test]
    fn test_syntax_error_is_compile_error() {
        let map = ImportMap::default();
        let mut rewriter = PathRewriter::new("/broken.ts", &map, true);
        let err = compile(
            &CompileInput {
                file: "/broken.ts",
                source: "export const = ;",
                source_type: SourceType::Ts,
                source_map: false,
            },
            &mut rewriter,
        )
        .unwrap_err();

        assert_eq!(err.file, "/broken.ts");
        assert!(!err.diagnostics.is_empty());
    }

    #[test]
    fn test_unresolved_specifiers_are_aggregated() {
        let map = ImportMap::default();
        let mut rewriter = PathRewriter::new("/x.ts", &map, true);
        let err = compile(
            &CompileInput {
                file: "/x.ts",
                source: "import a from 'left-pad';\nimport b from 'right-pad';\nexport { a, b };\n",
                source_type: SourceType::Ts,
                source_map: false,
            },
            &mut rewriter,
        )
        .unwrap_err();

        assert_eq!(err.diagnostics.len(), 2);
        assert!(err.to_string().contains("left-pad"));
    }

    #[test]
    fn test_source_map_emitted_on_request() {
        let map = ImportMap::default();
        let mut rewriter = PathRewriter::new("/x.ts", &map, true);
        let out = compile(
            &CompileInput {
                file: "/x.ts",
                source: "export const x: number = 1;\n",
                source_type: SourceType::Ts,
                source_map: true,
            },
            &mut rewriter,
        )
        .unwrap();

        let source_map = out.map.unwrap();
        assert!(source_map.contains("\"mappings\""));
    }
}
