//! End-to-end orchestration: `Program` + `SymbolTable` in, QBE IL text out.
//!
//! This ties the CFG builder and code generator together the way
//! `gcrecomp_core::recompiler::pipeline::RecompilationPipeline` ties
//! analysis, decoding and recompilation into one call. Neither stage's
//! semantics change here — `compile` is glue, not a third pipeline stage.

use crate::ast::Program;
use crate::cfg::builder::{build_program_cfg, CfgBuildOptions};
use crate::codegen::{CodeGenOptions, CodeGenerator};
use crate::diagnostics::Diagnostics;
use crate::symbols::SymbolTable;

/// Tunables for a whole `compile` run, one knob group per stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    pub cfg: CfgBuildOptions,
    pub codegen: CodeGenOptions,
}

/// Block/edge/function/literal counters surfaced for `--verbose` reporting,
/// the compiler-internal analogue of the teacher's `PipelineStats`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub functions: u32,
    pub blocks: u32,
    pub edges: u32,
    pub literals: u32,
    pub intrinsic_calls: u32,
}

/// A successful compile: the generated QBE IL text plus the run's stats.
/// Non-fatal diagnostics gathered along the way still live on the
/// `Diagnostics` the caller can separately request via [`compile_verbose`].
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub il: String,
    pub stats: PipelineStats,
}

/// Builds every CFG, then generates QBE IL for the whole program. Returns
/// `Err(Diagnostics)` only when a fatal `CfgBuildError` or `CodeGenError`
/// was raised (spec.md §7); anything merely tolerated is logged and
/// dropped on this entry point. Use [`compile_verbose`] to get the
/// complete `Diagnostics` back alongside a successful output.
pub fn compile(
    program: &Program,
    symbols: &SymbolTable,
    options: &PipelineOptions,
) -> Result<CompileOutput, Diagnostics> {
    let (output, diagnostics) = compile_verbose(program, symbols, options);
    match output {
        Some(output) => Ok(output),
        None => Err(diagnostics),
    }
}

/// Same as [`compile`], but always returns the accumulated [`Diagnostics`]
/// alongside the output (`None` only when a fatal error aborted the run).
pub fn compile_verbose(
    program: &Program,
    symbols: &SymbolTable,
    options: &PipelineOptions,
) -> (Option<CompileOutput>, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    log::debug!("pipeline: building control-flow graphs");
    let (program_cfg, cfg_errors) = build_program_cfg(program, symbols, &options.cfg);
    diagnostics.extend_cfg(cfg_errors);

    if diagnostics.has_fatal() {
        log::warn!("pipeline: aborting after fatal cfg error");
        return (None, diagnostics);
    }

    log::debug!("pipeline: generating QBE IL");
    let mut generator = CodeGenerator::new(symbols, options.codegen);
    let il = generator.generate(&program_cfg);
    diagnostics.extend_codegen(generator.diagnostics());

    if diagnostics.has_fatal() {
        log::warn!("pipeline: aborting after fatal codegen error");
        return (None, diagnostics);
    }

    let gen_stats = generator.stats();
    let stats = PipelineStats {
        functions: gen_stats.functions_emitted,
        blocks: gen_stats.blocks_emitted,
        edges: program_cfg.all_cfgs().map(|cfg| cfg.edges.len() as u32).sum(),
        literals: gen_stats.literals_emitted,
        intrinsic_calls: gen_stats.intrinsic_calls,
    };

    log::debug!(
        "pipeline: compiled {} function(s), {} block(s), {} edge(s), {} diagnostic(s)",
        stats.functions,
        stats.blocks,
        stats.edges,
        diagnostics.len()
    );

    (Some(CompileOutput { il, stats }), diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, Line, PrintItem, PrintSeparator, Statement};

    fn hello_world() -> Program {
        Program {
            lines: vec![Line {
                line_number: 10,
                statements: vec![Statement::Print {
                    items: vec![PrintItem {
                        expr: Expression::StringLiteral("hello".to_string()),
                        separator: PrintSeparator::None,
                    }],
                    suppress_newline: false,
                }],
            }],
        }
    }

    #[test]
    fn compiles_a_trivial_program() {
        let symbols = SymbolTable::new();
        let output = compile(&hello_world(), &symbols, &PipelineOptions::default())
            .expect("trivial program should compile cleanly");
        assert!(output.il.contains("export function w $main()"));
        assert_eq!(output.stats.functions, 1);
        assert!(output.stats.literals >= 1);
    }

    #[test]
    fn empty_on_list_is_reported_as_fatal() {
        let program = Program {
            lines: vec![Line {
                line_number: 10,
                statements: vec![Statement::OnGoto {
                    selector: Expression::IntLiteral(1),
                    targets: vec![],
                }],
            }],
        };
        let symbols = SymbolTable::new();
        let err = compile(&program, &symbols, &PipelineOptions::default())
            .expect_err("ON GOTO with no targets is fatal to the build");
        assert!(err.has_fatal());
    }
}
