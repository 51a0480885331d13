//! TypeScript to browser script transpilation
//!
//! App sources are written as TypeScript modules that export an `inject`
//! function. The preview page has no bundler, so the output must be a
//! classic script: types are stripped, syntax newer than ES2019 is lowered
//! where that needs no runtime helper, and every export becomes an
//! assignment onto a page-provided `exports` object.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, Declaration, ExportDefaultDeclarationKind, Statement,
};
use oxc_codegen::CodeGenerator;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use oxc_transformer::{TransformOptions, Transformer};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// Error while transpiling a source file
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TranspileError {
    /// The source failed to parse or transform
    #[error("{filename}: {}", .messages.join("\n"))]
    Syntax { filename: String, messages: Vec<String> },
    /// Module syntax that cannot run as a classic script
    #[error("{filename}: {message}")]
    Unsupported { filename: String, message: String },
}

impl TranspileError {
    fn unsupported(filename: &str, message: impl Into<String>) -> Self {
        TranspileError::Unsupported { filename: filename.to_string(), message: message.into() }
    }
}

/// Turns app source text into a script that can be inlined into a page.
pub trait Transpiler: Send + Sync {
    fn transpile(&self, source: &str, filename: &str) -> Result<String, TranspileError>;
}

/// Transpiler backed by the oxc parser, transformer and code generator.
#[derive(Debug, Clone, Default)]
pub struct OxcTranspiler;

impl OxcTranspiler {
    pub fn new() -> Self {
        Self
    }
}

impl Transpiler for OxcTranspiler {
    fn transpile(&self, source: &str, filename: &str) -> Result<String, TranspileError> {
        let lowered = lower_exports(source, filename)?;
        let code = strip_types(&lowered.source, filename)?;

        let mut output = code;
        if !lowered.bindings.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        for (exported, local) in &lowered.bindings {
            let _ = writeln!(output, "exports.{} = {};", exported, local);
        }
        Ok(output)
    }
}

/// Source with `export` syntax removed, plus the bindings to publish.
#[derive(Debug, Default)]
struct LoweredExports {
    source: String,
    /// `(exported name, local name)` pairs in declaration order
    bindings: Vec<(String, String)>,
}

struct Edit {
    start: usize,
    end: usize,
    replacement: &'static str,
}

/// Syntax newer than this is lowered when it needs no runtime helper.
const TARGET: &str = "es2019";

/// Module the transformer imports syntax helpers from.
const HELPER_MODULE_PREFIX: &str = "@babel/runtime/";

/// Every file is treated as TypeScript, whatever its extension.
fn source_type() -> SourceType {
    SourceType::ts()
}

fn syntax_error(filename: &str, errors: impl IntoIterator<Item = impl ToString>) -> TranspileError {
    TranspileError::Syntax {
        filename: filename.to_string(),
        messages: errors.into_iter().map(|e| e.to_string()).collect(),
    }
}

/// Rewrite top-level ES module exports into plain declarations.
fn lower_exports(source: &str, filename: &str) -> Result<LoweredExports, TranspileError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type()).parse();
    if !parsed.errors.is_empty() {
        return Err(syntax_error(filename, &parsed.errors));
    }
    let program = parsed.program;

    // Names that only exist at the type level never get an `exports.` line
    let mut type_names = HashSet::new();
    for stmt in &program.body {
        let decl = match stmt {
            Statement::ExportNamedDeclaration(export) => export.declaration.as_ref(),
            _ => stmt.as_declaration(),
        };
        match decl {
            Some(Declaration::TSInterfaceDeclaration(i)) => {
                type_names.insert(i.id.name.to_string());
            }
            Some(Declaration::TSTypeAliasDeclaration(t)) => {
                type_names.insert(t.id.name.to_string());
            }
            _ => {}
        }
    }

    let mut edits = Vec::new();
    let mut bindings = Vec::new();

    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(export) => {
                if export.source.is_some() {
                    return Err(TranspileError::unsupported(
                        filename,
                        "re-exporting from another module needs a bundler",
                    ));
                }
                let Some(decl) = &export.declaration else {
                    edits.push(Edit {
                        start: export.span.start as usize,
                        end: export.span.end as usize,
                        replacement: "",
                    });
                    if export.export_kind.is_type() {
                        continue;
                    }
                    for spec in &export.specifiers {
                        let local = spec.local.name().to_string();
                        if spec.export_kind.is_type() || type_names.contains(&local) {
                            continue;
                        }
                        bindings.push((spec.exported.name().to_string(), local));
                    }
                    continue;
                };

                edits.push(Edit {
                    start: export.span.start as usize,
                    end: decl.span().start as usize,
                    replacement: "",
                });
                for name in declared_names(decl, filename)? {
                    bindings.push((name.clone(), name));
                }
            }
            Statement::ExportDefaultDeclaration(export) => {
                // Named declarations stay bound in script scope
                let named = match &export.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        func.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        class.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                let interface =
                    matches!(export.declaration, ExportDefaultDeclarationKind::TSInterfaceDeclaration(_));
                let replacement = if interface || named.is_some() { "" } else { "exports.default = " };
                edits.push(Edit {
                    start: export.span.start as usize,
                    end: export.declaration.span().start as usize,
                    replacement,
                });
                if let Some(name) = named {
                    bindings.push(("default".to_string(), name));
                }
            }
            Statement::ExportAllDeclaration(_) => {
                return Err(TranspileError::unsupported(
                    filename,
                    "`export *` needs a bundler",
                ));
            }
            Statement::TSExportAssignment(_) => {
                return Err(TranspileError::unsupported(
                    filename,
                    "`export =` is not supported, use `export function inject`",
                ));
            }
            _ => {}
        }
    }

    let mut lowered = source.to_string();
    for edit in edits.iter().rev() {
        lowered.replace_range(edit.start..edit.end, edit.replacement);
    }
    Ok(LoweredExports { source: lowered, bindings })
}

/// Runtime bindings introduced by an exported declaration.
fn declared_names(decl: &Declaration<'_>, filename: &str) -> Result<Vec<String>, TranspileError> {
    let names = match decl {
        Declaration::VariableDeclaration(var) => {
            let mut names = Vec::with_capacity(var.declarations.len());
            for declarator in &var.declarations {
                match &declarator.id.kind {
                    BindingPatternKind::BindingIdentifier(ident) => {
                        names.push(ident.name.to_string());
                    }
                    _ => {
                        return Err(TranspileError::unsupported(
                            filename,
                            "destructured exports are not supported",
                        ));
                    }
                }
            }
            if var.declare {
                names.clear();
            }
            names
        }
        Declaration::FunctionDeclaration(func) => {
            if func.declare {
                return Ok(vec![]);
            }
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            if class.declare {
                return Ok(vec![]);
            }
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::TSEnumDeclaration(e) if !e.declare => vec![e.id.name.to_string()],
        _ => vec![],
    };
    Ok(names)
}

/// Strip TypeScript syntax and print plain JavaScript.
fn strip_types(source: &str, filename: &str) -> Result<String, TranspileError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, source_type()).parse();
    if !parsed.errors.is_empty() {
        return Err(syntax_error(filename, &parsed.errors));
    }
    let mut program = parsed.program;

    let semantic = SemanticBuilder::new().build(&program);
    if !semantic.errors.is_empty() {
        return Err(syntax_error(filename, &semantic.errors));
    }
    let (symbols, scopes) = semantic.semantic.into_symbol_table_and_scope_tree();

    let mut options = TransformOptions::from_target(TARGET)
        .map_err(|e| TranspileError::unsupported(filename, e.to_string()))?;
    // Plain assignments instead of the `defineProperty` helper
    options.assumptions.set_public_class_fields = true;
    let transformed = Transformer::new(&allocator, Path::new(filename), &options)
        .build_with_symbols_and_scopes(symbols, scopes, &mut program);
    if !transformed.errors.is_empty() {
        return Err(syntax_error(filename, &transformed.errors));
    }

    // Dropping type-only module syntax can leave an `export {}` marker behind
    program.body.retain(|stmt| !is_empty_export(stmt));

    for stmt in &program.body {
        if let Statement::ImportDeclaration(import) = stmt {
            let message = if import.source.value.starts_with(HELPER_MODULE_PREFIX) {
                format!("this syntax needs the runtime helper '{}'", import.source.value)
            } else {
                "imports need a bundler; only type imports are allowed".to_string()
            };
            return Err(TranspileError::unsupported(filename, message));
        }
    }

    Ok(CodeGenerator::new().build(&program).code)
}

fn is_empty_export(stmt: &Statement<'_>) -> bool {
    match stmt {
        Statement::ExportNamedDeclaration(export) => {
            export.declaration.is_none() && export.specifiers.is_empty() && export.source.is_none()
        }
        _ => false,
    }
}
