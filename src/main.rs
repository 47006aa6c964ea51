//! Veil compiler CLI.
//!
//! ```text
//! veilc <source> [-o <out>] [--run] [--emit tokens|ast|mir]
//! ```
//!
//! The driver runs the core pipeline (lex, parse, analyze, lower to MIR,
//! validate) and then delegates: `-o out.mir` writes the textual MIR,
//! `-o out.obj` invokes the configured external code generator, and any
//! other output path additionally drives the platform linker. `--run`
//! executes the linked binary. Exit code is 0 on success and 1 on any
//! error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser as ClapParser, ValueEnum};
use tracing_subscriber::EnvFilter;

use veilc::backend::linker::{Linker, ToolPaths};
use veilc::backend::{CodegenInput, ExternalCodegen, MirTextEmitter, ObjectEmitter};
use veilc::DiagnosticEmitter;

/// The Veil programming language compiler.
#[derive(ClapParser)]
#[command(name = "veilc")]
#[command(version)]
#[command(about = "The Veil programming language compiler", long_about = None)]
struct Cli {
    /// Source file to compile
    #[arg(value_name = "FILE")]
    source: PathBuf,

    /// Output path: `.mir` writes textual MIR, `.obj` stops at the object
    /// file, anything else links an executable
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    output: Option<PathBuf>,

    /// Run the produced executable after linking
    #[arg(long)]
    run: bool,

    /// Print a stage artifact to stdout and stop
    #[arg(long, value_enum, value_name = "STAGE")]
    emit: Option<EmitStage>,

    /// Tool-path configuration naming the code generator and linker
    #[arg(long, value_name = "FILE", default_value = "ToolPath.md")]
    tool_config: PathBuf,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum EmitStage {
    Tokens,
    Ast,
    Mir,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let source = std::fs::read_to_string(&cli.source)
        .map_err(|e| format!("could not open {}: {e}", cli.source.display()))?;
    let filename = cli.source.display().to_string();

    if cli.emit == Some(EmitStage::Tokens) {
        for token in veilc::Lexer::new(&source) {
            println!(
                "{:>4}:{:<3} {:?}",
                token.span.line, token.span.column, token.kind
            );
        }
        return Ok(());
    }

    if cli.emit == Some(EmitStage::Ast) {
        let mut parser = veilc::Parser::new(&source);
        return match parser.parse_program() {
            Ok(program) => {
                println!("{program:#?}");
                Ok(())
            }
            Err(diagnostic) => {
                DiagnosticEmitter::new(&filename, &source).emit(&diagnostic);
                Err("parsing failed".into())
            }
        };
    }

    let base_dir = cli
        .source
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let unit = match veilc::compile_to_mir(&source, &base_dir) {
        Ok(unit) => unit,
        Err(diagnostic) => {
            DiagnosticEmitter::new(&filename, &source).emit(&diagnostic);
            return Err("compilation failed".into());
        }
    };

    if cli.emit == Some(EmitStage::Mir) {
        print!("{}", unit.module);
        return Ok(());
    }

    let Some(output) = &cli.output else {
        return Ok(());
    };

    let input = CodegenInput {
        module: &unit.module,
        types: &unit.types,
        used_externals: &unit.used_externals,
    };

    if output.extension().is_some_and(|ext| ext == "mir") {
        return MirTextEmitter
            .emit_object(&input, output)
            .map_err(|e| e.to_string());
    }

    // Object emission and linking are delegated to the configured tools.
    let tools = ToolPaths::load(&cli.tool_config).map_err(|e| e.to_string())?;
    let codegen_tool = tools.codegen.clone().ok_or_else(|| {
        format!(
            "no code generator configured; add a `## codegen` section to {}",
            cli.tool_config.display()
        )
    })?;

    let stops_at_object = output
        .extension()
        .is_some_and(|ext| ext == "obj" || ext == "o");
    let obj_path = if stops_at_object {
        output.clone()
    } else {
        output.with_extension("obj")
    };

    ExternalCodegen::new(codegen_tool)
        .emit_object(&input, &obj_path)
        .map_err(|e| e.to_string())?;
    if stops_at_object {
        return Ok(());
    }

    Linker::new(tools)
        .link(&obj_path, output)
        .map_err(|e| e.to_string())?;

    if cli.run {
        let status = std::process::Command::new(output)
            .status()
            .map_err(|e| format!("could not run {}: {e}", output.display()))?;
        if !status.success() {
            return Err(format!("{} exited with {status}", output.display()));
        }
    }
    Ok(())
}
