//! The seam between the compiler core and its external collaborators.
//!
//! The core stops at validated MIR. Object emission and linking are
//! delegated: [`CodegenInput`] bundles everything an object emitter needs
//! (the MIR module, the type table for computing struct layouts, and the
//! external functions the program uses), [`ObjectEmitter`] is the trait a
//! code generator implements, and [`linker`] drives the platform linker
//! from a tool-path configuration file.

pub mod linker;

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::mir;
use crate::types::Type;

/// Named aggregate types the code generator needs for layout computation.
#[derive(Debug, Default)]
pub struct TypeTable {
    pub structs: HashMap<String, Type>,
    pub enums: HashMap<String, Type>,
}

/// Everything the core hands to a code generator.
pub struct CodegenInput<'a> {
    pub module: &'a mir::Module,
    pub types: &'a TypeTable,
    /// External functions referenced by the MIR (`malloc`, `free`); the
    /// emitter must declare these before emitting bodies.
    pub used_externals: &'a [String],
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tool configuration error: {0}")]
    Config(String),

    #[error("external tool failed: {0}")]
    Tool(String),
}

/// An object-file emitter. The native (LLVM-backed) implementation lives
/// outside this crate; [`MirTextEmitter`] writes the textual MIR and exists
/// for debugging and for driving external tooling.
pub trait ObjectEmitter {
    fn emit_object(&mut self, input: &CodegenInput<'_>, out: &Path) -> Result<(), BackendError>;
}

/// Writes the module in its textual form. Useful with `-o out.mir` and as
/// the interchange format for an out-of-process code generator.
#[derive(Debug, Default)]
pub struct MirTextEmitter;

impl ObjectEmitter for MirTextEmitter {
    fn emit_object(&mut self, input: &CodegenInput<'_>, out: &Path) -> Result<(), BackendError> {
        let mut file = std::fs::File::create(out)?;
        for external in input.used_externals {
            writeln!(file, "extern {external}")?;
        }
        write!(file, "{}", input.module)?;
        Ok(())
    }
}

/// Drives an external code generator process: the MIR is serialized to a
/// sibling `.mir` file and the configured tool is invoked to produce the
/// object file.
pub struct ExternalCodegen {
    tool: std::path::PathBuf,
}

impl ExternalCodegen {
    pub fn new(tool: impl Into<std::path::PathBuf>) -> Self {
        Self { tool: tool.into() }
    }
}

impl ObjectEmitter for ExternalCodegen {
    fn emit_object(&mut self, input: &CodegenInput<'_>, out: &Path) -> Result<(), BackendError> {
        let mir_path = out.with_extension("mir");
        MirTextEmitter.emit_object(input, &mir_path)?;

        tracing::debug!(tool = %self.tool.display(), out = %out.display(), "invoking code generator");
        let status = std::process::Command::new(&self.tool)
            .arg(&mir_path)
            .arg("-o")
            .arg(out)
            .status()
            .map_err(|e| BackendError::Tool(format!("{}: {e}", self.tool.display())))?;

        if !status.success() {
            return Err(BackendError::Tool(format!(
                "{} exited with {status}",
                self.tool.display()
            )));
        }
        Ok(())
    }
}
