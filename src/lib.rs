//! # Veil Compiler Library
//!
//! The compiler core for the Veil programming language: a statically typed
//! systems language with primitive numerics, pointers and arrays, algebraic
//! enums with payloads, classes with constructors, methods and destructors,
//! generics with request constraints, pattern matching, modules with
//! visibility, and a built-in `Result[T, E]` with the `?` propagation
//! operator.
//!
//! ## Compiler pipeline
//!
//! ```text
//! Source -> Lexer -> Parser -> AST -> Sema (+ monomorphization) -> MIR -> (external) object & link
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use veilc::compile_to_mir;
//!
//! let source = "fn main(): i32 { return 41 + 1; }";
//! let unit = compile_to_mir(source, std::path::Path::new(".")).expect("compiles");
//! assert!(unit.module.find_function("main").is_some());
//! ```
//!
//! ## Module overview
//!
//! - [`lexer`] - tokenization
//! - [`parser`] - recursive descent + precedence climbing
//! - [`ast`] - syntax tree types
//! - [`types`] - the shared type algebra
//! - [`sema`] - name resolution, type checking, monomorphization
//! - [`mir`] - the basic-block IR, its builder and validator
//! - [`backend`] - contracts for the external code generator and linker
//! - [`diagnostics`] - error reporting
//! - [`span`] - source location tracking

pub mod ast;
pub mod backend;
pub mod diagnostics;
pub mod lexer;
pub mod mir;
pub mod parser;
pub mod sema;
pub mod span;
pub mod types;

use std::path::Path;

pub use diagnostics::{Diagnostic, DiagnosticEmitter, ErrorCode};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use sema::Sema;
pub use span::Span;

/// The output of the core pipeline, ready to hand to a code generator.
#[derive(Debug)]
pub struct CompiledUnit {
    pub module: mir::Module,
    pub types: backend::TypeTable,
    pub used_externals: Vec<String>,
}

/// Drive a source string through the whole core pipeline: parse, analyze,
/// lower to MIR, validate. Imports resolve relative to `base_dir`.
pub fn compile_to_mir(source: &str, base_dir: &Path) -> Result<CompiledUnit, Diagnostic> {
    let mut parser = Parser::new(source);
    let mut program = parser.parse_program()?;

    let mut sema = Sema::with_base_dir(base_dir.to_path_buf());
    sema.analyze_program(&mut program).map_err(Diagnostic::from)?;
    tracing::info!("semantic analysis passed");

    let mut builder = mir::MirBuilder::new();
    for name in sema.modules().keys() {
        builder.add_module_name(name);
    }
    // Owned nodes (built-ins, imports, monomorphized clones) lower first so
    // their types and functions are registered before the program uses them.
    for node in sema.owned_nodes() {
        builder.lower(node)?;
    }
    for node in &program {
        builder.lower(node)?;
    }
    let (module, types, used_externals) = builder.finish();
    tracing::info!(functions = module.functions.len(), "MIR lowering successful");

    let results = mir::validate_module(&module);
    for warning in &results.warnings {
        tracing::debug!(%warning, "MIR validation warning");
    }
    if let Some(error) = results.errors.into_iter().next() {
        return Err(error);
    }

    Ok(CompiledUnit {
        module,
        types,
        used_externals,
    })
}
