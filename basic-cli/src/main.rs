//! Command-line driver: reads a serialized `Program`/`SymbolTable`, runs
//! them through `basic_core::pipeline::compile`, and writes the resulting
//! QBE IL. Standing in for the place a real lexer/parser/semantic-analyzer
//! pipeline would hand off (see the crate's top-level documentation).

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use basic_core::ast::Program;
use basic_core::pipeline::{compile_verbose, PipelineOptions};
use basic_core::symbols::SymbolTable;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

/// A compiled-unit JSON document: the `Program` an upstream lexer/parser
/// would produce, plus the `SymbolTable` a semantic analyzer would have
/// already resolved against it.
#[derive(Debug, Deserialize)]
struct CompilationUnit {
    program: Program,
    #[serde(default)]
    symbols: SymbolTable,
}

#[derive(Parser)]
#[command(name = "basic")]
#[command(about = "AST-to-QBE compiler back end for a classic BASIC dialect")]
#[command(version)]
struct Cli {
    /// Path to a JSON document holding the `Program` and `SymbolTable` to
    /// compile (the place a lexer/parser/semantic analyzer would hand off).
    input: PathBuf,

    /// Where to write the generated QBE IL. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print pipeline stats and per-diagnostic detail to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Skip emitting source-line comments above generated instructions.
    #[arg(long)]
    no_comments: bool,

    /// Skip emitting array bounds-check calls.
    #[arg(long)]
    no_bounds_checks: bool,

    /// Merge the Phase 5 empty-block cleanup pass (on by default).
    #[arg(long)]
    no_merge_empty_blocks: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("basic: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let pb = create_progress_bar(&format!("compiling {}...", cli.input.display()));

    let raw = match fs::read_to_string(&cli.input) {
        Ok(raw) => raw,
        Err(err) => {
            pb.finish_and_clear();
            eprintln!(
                "basic: reading input file {}: {err}",
                cli.input.display()
            );
            return Ok(ExitCode::from(1));
        }
    };
    let unit: CompilationUnit = match serde_json::from_str(&raw) {
        Ok(unit) => unit,
        Err(err) => {
            pb.finish_and_clear();
            eprintln!(
                "basic: parsing {} as a compilation unit: {err}",
                cli.input.display()
            );
            return Ok(ExitCode::from(1));
        }
    };

    let options = PipelineOptions {
        cfg: basic_core::cfg::builder::CfgBuildOptions {
            create_exit_block: true,
            merge_empty_blocks: !cli.no_merge_empty_blocks,
        },
        codegen: basic_core::codegen::CodeGenOptions {
            emit_comments: !cli.no_comments,
            bounds_checks: !cli.no_bounds_checks,
            emit_stats: cli.verbose,
        },
    };

    let (output, diagnostics) = compile_verbose(&unit.program, &unit.symbols, &options);
    pb.finish_and_clear();

    if cli.verbose {
        for err in diagnostics.cfg_errors() {
            eprintln!("cfg warning: {err}");
        }
        for err in diagnostics.codegen_errors() {
            eprintln!("codegen warning: {err}");
        }
    }

    let Some(output) = output else {
        eprintln!("basic: compilation failed:\n{diagnostics}");
        return Ok(ExitCode::from(1));
    };

    match cli.output {
        Some(path) => {
            fs::write(&path, &output.il)
                .with_context(|| format!("writing output file {}", path.display()))?;
        }
        None => {
            std::io::stdout()
                .write_all(output.il.as_bytes())
                .context("writing IL to stdout")?;
        }
    }

    if cli.verbose {
        eprintln!(
            "compiled {} function(s), {} block(s), {} edge(s), {} literal(s), {} diagnostic(s)",
            output.stats.functions,
            output.stats.blocks,
            output.stats.edges,
            output.stats.literals,
            diagnostics.len()
        );
    }

    Ok(ExitCode::SUCCESS)
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    pb
}
