//! The CFG builder (spec.md §4.1).
//!
//! Phases 1 and 2 of spec.md §4.1 are fused into a single forward traversal
//! for every construct whose edges only ever reference blocks that already
//! exist by the time the construct closes (IF, FOR/NEXT, WHILE/WEND,
//! DO/LOOP, REPEAT/UNTIL, SELECT CASE, TRY/CATCH/FINALLY) — there is no
//! correctness reason to defer those to a second pass, and fusing them
//! avoids a redundant walk of the same statement list. GOTO, GOSUB, ON
//! GOTO/ON GOSUB, ON EVENT and bare RETURN genuinely need a separate pass
//! (`wire_jump_edges`) because their targets can be forward references to
//! lines the single forward walk hasn't reached yet. Phase 0 (landing-zone
//! pre-scan), Phase 3 (loop identification) and Phase 4 (subroutine
//! identification) remain distinct passes, matching spec.md §4.1.

use crate::ast::{
    CaseWhenClause, CatchClause, DoConditionType, EventHandlerKind, ExitKind, Expression,
    JumpTarget, Param, Program, Statement,
};
use crate::cfg::constructs::{
    DoLoopInfo, ForLoopInfo, RepeatLoopInfo, SelectCaseInfo, TryInfo, WhileLoopInfo,
};
use crate::cfg::error::{CfgBuildError, CfgBuildErrorKind};
use crate::cfg::loop_analysis;
use crate::cfg::{ControlFlowGraph, DefFnInfo, EdgeKind, FunctionMeta, ProgramCFG};
use crate::symbols::SymbolTable;
use crate::types::VariableType;
use std::collections::{HashMap, HashSet};

/// Tunables for [`build_program_cfg`]. The defaults match what spec.md §4.1
/// describes; `merge_empty_blocks` gates the optional Phase 5 cleanup pass.
#[derive(Debug, Clone, Copy)]
pub struct CfgBuildOptions {
    pub create_exit_block: bool,
    pub merge_empty_blocks: bool,
}

impl Default for CfgBuildOptions {
    fn default() -> Self {
        Self {
            create_exit_block: true,
            merge_empty_blocks: true,
        }
    }
}

struct ForCtx<'ast> {
    init_block: u32,
    check_block: u32,
    body_block: u32,
    variable: String,
    start: &'ast Expression,
    end: &'ast Expression,
    step: Option<&'ast Expression>,
    pending_exits: Vec<u32>,
}

struct WhileCtx {
    header: u32,
    body_entry: u32,
    pending_exits: Vec<u32>,
}

struct DoCtx {
    header: u32,
    body_entry: u32,
    pre_test: DoConditionType,
    pending_exits: Vec<u32>,
}

struct RepeatCtx {
    header: u32,
    pending_exits: Vec<u32>,
}

struct CfgBuilder<'ast> {
    diagnostics: Vec<CfgBuildError>,
    current: u32,
    for_stack: Vec<ForCtx<'ast>>,
    while_stack: Vec<WhileCtx>,
    do_stack: Vec<DoCtx>,
    repeat_stack: Vec<RepeatCtx>,
}

/// Builds the main program's CFG plus one CFG per FUNCTION/SUB. `DEF FN`
/// bodies are a single expression and get no CFG of their own — the code
/// generator lowers them directly (see `ast::Statement::Def`'s doc comment).
pub fn build_program_cfg<'ast>(
    program: &'ast Program,
    symbols: &SymbolTable,
    options: &CfgBuildOptions,
) -> (ProgramCFG<'ast>, Vec<CfgBuildError>) {
    let mut diagnostics = Vec::new();
    let mut functions = HashMap::new();
    let mut def_functions = HashMap::new();
    let mut main_entries: Vec<(u32, &'ast Statement)> = Vec::new();

    for line in &program.lines {
        for stmt in &line.statements {
            match stmt {
                Statement::Function {
                    name,
                    parameters,
                    return_type,
                    body,
                } => {
                    let meta = function_meta(name, parameters, *return_type, false);
                    let (cfg, mut diags) =
                        build_one_cfg(flatten_body(body), symbols, options, Some(meta));
                    diagnostics.append(&mut diags);
                    functions.insert(name.clone(), cfg);
                }
                Statement::Sub {
                    name,
                    parameters,
                    body,
                } => {
                    let meta = function_meta(name, parameters, VariableType::Integer, true);
                    let (cfg, mut diags) =
                        build_one_cfg(flatten_body(body), symbols, options, Some(meta));
                    diagnostics.append(&mut diags);
                    functions.insert(name.clone(), cfg);
                }
                Statement::Def {
                    name,
                    parameters,
                    body,
                } => {
                    def_functions.insert(
                        name.clone(),
                        DefFnInfo {
                            parameters,
                            body,
                        },
                    );
                }
                other => main_entries.push((line.line_number, other)),
            }
        }
    }

    let (main, mut diags) = build_one_cfg(main_entries, symbols, options, None);
    diagnostics.append(&mut diags);

    log::debug!(
        "cfg build: {} line(s), {} function/sub CFG(s), {} diagnostic(s)",
        program.lines.len(),
        functions.len(),
        diagnostics.len()
    );
    for diag in &diagnostics {
        if diag.is_fatal() {
            log::warn!("fatal cfg error at line {}: {}", diag.line, diag.kind);
        } else {
            log::debug!("tolerated cfg error at line {}: {}", diag.line, diag.kind);
        }
    }

    (
        ProgramCFG {
            main,
            functions,
            def_functions,
        },
        diagnostics,
    )
}

fn function_meta(
    name: &str,
    parameters: &[Param],
    return_type: VariableType,
    is_sub: bool,
) -> FunctionMeta {
    FunctionMeta {
        name: name.to_string(),
        parameters: parameters
            .iter()
            .map(|p| (p.name.clone(), p.param_type))
            .collect(),
        return_type,
        is_sub,
    }
}

fn flatten_body<'ast>(body: &'ast [Statement]) -> Vec<(u32, &'ast Statement)> {
    body.iter()
        .enumerate()
        .map(|(i, s)| (i as u32 + 1, s))
        .collect()
}

fn build_one_cfg<'ast>(
    entries: Vec<(u32, &'ast Statement)>,
    symbols: &SymbolTable,
    options: &CfgBuildOptions,
    function: Option<FunctionMeta>,
) -> (ControlFlowGraph<'ast>, Vec<CfgBuildError>) {
    let mut g = ControlFlowGraph::new();
    g.function = function;

    let entry = new_block(&mut g);
    g.entry_block = entry;

    let jump_targets = collect_jump_targets(&entries);

    let mut builder = CfgBuilder {
        diagnostics: Vec::new(),
        current: entry,
        for_stack: Vec::new(),
        while_stack: Vec::new(),
        do_stack: Vec::new(),
        repeat_stack: Vec::new(),
    };

    let mut last_line: Option<u32> = None;
    for (line, stmt) in &entries {
        if last_line != Some(*line) {
            builder.ensure_line_boundary(&mut g, *line, &jump_targets);
            last_line = Some(*line);
        }
        builder.place_statement(&mut g, stmt, *line);
    }

    for ctx in builder.for_stack.drain(..) {
        builder.diagnostics.push(CfgBuildError::new(
            CfgBuildErrorKind::NextWithoutFor,
            0,
            format!("FOR {} never closed by a matching NEXT", ctx.variable),
        ));
    }

    if options.create_exit_block {
        g.exit_block = new_block(&mut g);
    } else {
        g.exit_block = builder.current;
    }

    let mut diagnostics = builder.diagnostics;
    wire_jump_edges(&mut g, symbols, &mut diagnostics);
    finalize_terminators(&mut g);

    loop_analysis::identify_loops(&mut g);
    identify_subroutines(&mut g);

    if options.merge_empty_blocks {
        merge_noop_blocks(&mut g);
    }

    (g, diagnostics)
}

fn new_block<'ast>(g: &mut ControlFlowGraph<'ast>) -> u32 {
    let id = g.blocks.len() as u32;
    g.blocks.push(crate::cfg::BasicBlock::new(id));
    id
}

fn collect_jump_targets<'ast>(entries: &[(u32, &'ast Statement)]) -> HashSet<u32> {
    let mut out = HashSet::new();
    for (_, stmt) in entries {
        collect_jump_targets_stmt(stmt, &mut out);
    }
    out
}

fn collect_jump_targets_stmt(stmt: &Statement, out: &mut HashSet<u32>) {
    match stmt {
        Statement::Goto(JumpTarget::Line(n)) | Statement::Gosub(JumpTarget::Line(n)) => {
            out.insert(*n);
        }
        Statement::OnGoto { targets, .. } | Statement::OnGosub { targets, .. } => {
            for t in targets {
                if let JumpTarget::Line(n) = t {
                    out.insert(*n);
                }
            }
        }
        Statement::OnEvent {
            target: JumpTarget::Line(n),
            ..
        } => {
            out.insert(*n);
        }
        Statement::If {
            then_statements,
            else_statements,
            goto_target,
            ..
        } => {
            if let Some(JumpTarget::Line(n)) = goto_target {
                out.insert(*n);
            }
            for s in then_statements {
                collect_jump_targets_stmt(s, out);
            }
            for s in else_statements {
                collect_jump_targets_stmt(s, out);
            }
        }
        Statement::Case {
            when_clauses,
            otherwise_statements,
            ..
        } => {
            for c in when_clauses {
                for s in &c.statements {
                    collect_jump_targets_stmt(s, out);
                }
            }
            if let Some(stmts) = otherwise_statements {
                for s in stmts {
                    collect_jump_targets_stmt(s, out);
                }
            }
        }
        Statement::TryCatch {
            try_block,
            catch_clauses,
            finally_block,
        } => {
            for s in try_block {
                collect_jump_targets_stmt(s, out);
            }
            for c in catch_clauses {
                for s in &c.block {
                    collect_jump_targets_stmt(s, out);
                }
            }
            if let Some(stmts) = finally_block {
                for s in stmts {
                    collect_jump_targets_stmt(s, out);
                }
            }
        }
        _ => {}
    }
}

impl<'ast> CfgBuilder<'ast> {
    fn ensure_line_boundary(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        line: u32,
        jump_targets: &HashSet<u32>,
    ) {
        if jump_targets.contains(&line) && !g.block(self.current).is_empty() {
            self.current = new_block(g);
        }
        g.line_number_to_block.entry(line).or_insert(self.current);
    }

    fn build_stmt_list(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        stmts: &'ast [Statement],
        line: u32,
    ) -> bool {
        let mut ended = false;
        for stmt in stmts {
            ended = self.place_statement(g, stmt, line);
        }
        ended
    }

    /// Places one statement into the current block and dispatches any
    /// structural effect it has on the graph. Returns whether the statement
    /// left control flow in a state where an implicit fallthrough to
    /// whatever comes next in the caller's list would be wrong.
    fn place_statement(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        stmt: &'ast Statement,
        line: u32,
    ) -> bool {
        g.block_mut(self.current).push(stmt, line);
        match stmt {
            Statement::Goto(_) | Statement::Return(_) | Statement::End | Statement::Throw(_) => {
                g.block_mut(self.current).is_terminator = true;
                self.current = new_block(g);
                true
            }
            Statement::Exit(kind) => {
                g.block_mut(self.current).is_terminator = true;
                let here = self.current;
                match kind {
                    ExitKind::ForLoop => {
                        if let Some(ctx) = self.for_stack.last_mut() {
                            ctx.pending_exits.push(here);
                        }
                    }
                    ExitKind::Do => {
                        if let Some(ctx) = self.do_stack.last_mut() {
                            ctx.pending_exits.push(here);
                        }
                    }
                    ExitKind::While => {
                        if let Some(ctx) = self.while_stack.last_mut() {
                            ctx.pending_exits.push(here);
                        }
                    }
                    ExitKind::Function | ExitKind::Sub => {}
                }
                self.current = new_block(g);
                true
            }
            Statement::Gosub(_) => {
                let source = self.current;
                let ret = new_block(g);
                g.gosub_return_blocks.insert(ret);
                g.gosub_return_map.insert(source, ret);
                self.current = ret;
                false
            }
            Statement::OnGoto { .. } => {
                g.block_mut(self.current).is_terminator = true;
                self.current = new_block(g);
                false
            }
            Statement::OnGosub { .. } => {
                let source = self.current;
                g.block_mut(source).is_terminator = true;
                let fallback = new_block(g);
                g.gosub_return_map.insert(source, fallback);
                g.gosub_return_blocks.insert(fallback);
                self.current = fallback;
                false
            }
            Statement::OnEvent { .. } => {
                g.block_mut(self.current).is_terminator = true;
                self.current = new_block(g);
                false
            }
            Statement::Label(name) => {
                let block = new_block(g);
                g.block_mut(block).label = Some(name.clone());
                self.current = block;
                false
            }
            Statement::If {
                then_statements,
                else_statements,
                has_goto,
                ..
            } => {
                self.place_if(g, *has_goto, then_statements, else_statements, line);
                false
            }
            Statement::For {
                variable,
                start,
                end,
                step,
            } => {
                self.place_for(g, variable, start, end, step.as_ref());
                false
            }
            Statement::Next { .. } => {
                self.place_next(g, line);
                false
            }
            Statement::While { .. } => {
                self.place_while(g);
                false
            }
            Statement::Wend => {
                self.place_wend(g, line);
                false
            }
            Statement::Do { condition_type, .. } => {
                self.place_do(g, *condition_type);
                false
            }
            Statement::Loop { condition_type, .. } => {
                self.place_loop(g, *condition_type, line);
                false
            }
            Statement::Repeat => {
                self.place_repeat(g);
                false
            }
            Statement::Until { .. } => {
                self.place_until(g, line);
                false
            }
            Statement::Case {
                when_clauses,
                otherwise_statements,
                ..
            } => {
                self.place_case(g, when_clauses, otherwise_statements, line);
                false
            }
            Statement::TryCatch {
                try_block,
                catch_clauses,
                finally_block,
            } => {
                self.place_try(g, try_block, catch_clauses, finally_block, line);
                false
            }
            _ => false,
        }
    }

    fn place_if(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        has_goto: bool,
        then_statements: &'ast [Statement],
        else_statements: &'ast [Statement],
        line: u32,
    ) {
        let cond_block = self.current;
        if has_goto {
            g.block_mut(cond_block).is_terminator = true;
            self.current = new_block(g);
            return;
        }

        let then_block = new_block(g);
        self.current = then_block;
        let then_ended = self.build_stmt_list(g, then_statements, line);
        let then_tip = self.current;

        let else_info = if else_statements.is_empty() {
            None
        } else {
            let else_block = new_block(g);
            self.current = else_block;
            let else_ended = self.build_stmt_list(g, else_statements, line);
            Some((else_block, self.current, else_ended))
        };

        let merge_block = new_block(g);
        g.add_edge(cond_block, then_block, EdgeKind::Conditional, Some("true"));
        let false_target = else_info.map(|(eb, _, _)| eb).unwrap_or(merge_block);
        g.add_edge(cond_block, false_target, EdgeKind::Conditional, Some("false"));

        if !then_ended {
            g.add_edge(then_tip, merge_block, EdgeKind::Unconditional, None);
        }
        if let Some((_, else_tip, else_ended)) = else_info {
            if !else_ended {
                g.add_edge(else_tip, merge_block, EdgeKind::Unconditional, None);
            }
        }
        self.current = merge_block;
    }

    fn place_for(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        variable: &str,
        start: &'ast Expression,
        end: &'ast Expression,
        step: Option<&'ast Expression>,
    ) {
        let init_block = self.current;
        let check_block = new_block(g);
        g.add_edge(init_block, check_block, EdgeKind::Fallthrough, None);
        g.block_mut(check_block).is_loop_header = true;
        self.current = check_block;
        let body_block = new_block(g);
        self.for_stack.push(ForCtx {
            init_block,
            check_block,
            body_block,
            variable: variable.to_string(),
            start,
            end,
            step,
            pending_exits: Vec::new(),
        });
        self.current = body_block;
    }

    fn place_next(&mut self, g: &mut ControlFlowGraph<'ast>, line: u32) {
        let body_tail = self.current;
        let moved = g.block_mut(body_tail).statements.pop();
        let next_block = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(next_block).statements.push(entry);
        }
        g.add_edge(body_tail, next_block, EdgeKind::Fallthrough, None);

        let Some(ctx) = self.for_stack.pop() else {
            self.diagnostics.push(CfgBuildError::new(
                CfgBuildErrorKind::NextWithoutFor,
                line,
                "NEXT with no open FOR",
            ));
            self.current = next_block;
            return;
        };

        g.next_to_header.insert(next_block, ctx.check_block);
        g.add_edge(next_block, ctx.check_block, EdgeKind::Unconditional, None);

        let exit_block = new_block(g);
        g.add_edge(
            ctx.check_block,
            ctx.body_block,
            EdgeKind::Conditional,
            Some("continue"),
        );
        g.add_edge(
            ctx.check_block,
            exit_block,
            EdgeKind::Conditional,
            Some("done"),
        );
        for pending in &ctx.pending_exits {
            g.add_edge(*pending, exit_block, EdgeKind::Unconditional, None);
        }

        g.for_loops.push(ForLoopInfo {
            init_block: ctx.init_block,
            check_block: ctx.check_block,
            body_block: ctx.body_block,
            next_block,
            exit_block,
            variable: ctx.variable,
            start: ctx.start,
            end: ctx.end,
            step: ctx.step,
        });
        self.current = exit_block;
    }

    fn place_while(&mut self, g: &mut ControlFlowGraph<'ast>) {
        let source = self.current;
        let moved = g.block_mut(source).statements.pop();
        let header = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(header).statements.push(entry);
        }
        g.add_edge(source, header, EdgeKind::Fallthrough, None);
        g.block_mut(header).is_loop_header = true;
        self.current = header;
        let body = new_block(g);
        self.while_stack.push(WhileCtx {
            header,
            body_entry: body,
            pending_exits: Vec::new(),
        });
        self.current = body;
    }

    fn place_wend(&mut self, g: &mut ControlFlowGraph<'ast>, line: u32) {
        let wend_block = self.current;
        let Some(ctx) = self.while_stack.pop() else {
            self.diagnostics.push(CfgBuildError::new(
                CfgBuildErrorKind::WendWithoutWhile,
                line,
                "WEND with no open WHILE",
            ));
            self.current = new_block(g);
            return;
        };
        g.add_edge(wend_block, ctx.header, EdgeKind::Unconditional, None);

        let exit_block = new_block(g);
        g.add_edge(
            ctx.header,
            ctx.body_entry,
            EdgeKind::Conditional,
            Some("true"),
        );
        g.add_edge(ctx.header, exit_block, EdgeKind::Conditional, Some("false"));
        for pending in &ctx.pending_exits {
            g.add_edge(*pending, exit_block, EdgeKind::Unconditional, None);
        }

        g.while_loops.push(WhileLoopInfo {
            header_block: ctx.header,
            wend_block,
            exit_block,
        });
        self.current = exit_block;
    }

    fn place_do(&mut self, g: &mut ControlFlowGraph<'ast>, pre_test: DoConditionType) {
        let source = self.current;
        let moved = g.block_mut(source).statements.pop();
        let header = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(header).statements.push(entry);
        }
        g.add_edge(source, header, EdgeKind::Fallthrough, None);
        g.block_mut(header).is_loop_header = true;
        self.current = header;
        let body = new_block(g);
        self.do_stack.push(DoCtx {
            header,
            body_entry: body,
            pre_test,
            pending_exits: Vec::new(),
        });
        self.current = body;
    }

    fn place_loop(&mut self, g: &mut ControlFlowGraph<'ast>, post_test: DoConditionType, line: u32) {
        let tip = self.current;
        let moved = g.block_mut(tip).statements.pop();
        let loop_block = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(loop_block).statements.push(entry);
        }
        g.add_edge(tip, loop_block, EdgeKind::Fallthrough, None);

        let Some(ctx) = self.do_stack.pop() else {
            self.diagnostics.push(CfgBuildError::new(
                CfgBuildErrorKind::LoopWithoutDo,
                line,
                "LOOP with no open DO",
            ));
            self.current = new_block(g);
            return;
        };

        let exit_block = new_block(g);

        if ctx.pre_test != DoConditionType::None {
            g.add_edge(
                ctx.header,
                ctx.body_entry,
                EdgeKind::Conditional,
                Some("true"),
            );
            g.add_edge(ctx.header, exit_block, EdgeKind::Conditional, Some("false"));
        } else {
            g.add_edge(ctx.header, ctx.body_entry, EdgeKind::Fallthrough, None);
        }

        if post_test != DoConditionType::None {
            g.add_edge(loop_block, ctx.header, EdgeKind::Conditional, Some("true"));
            g.add_edge(loop_block, exit_block, EdgeKind::Conditional, Some("false"));
        } else {
            g.add_edge(loop_block, ctx.header, EdgeKind::Unconditional, None);
        }

        for pending in &ctx.pending_exits {
            g.add_edge(*pending, exit_block, EdgeKind::Unconditional, None);
        }

        g.do_loops.push(DoLoopInfo {
            header_block: ctx.header,
            loop_block,
            exit_block,
            pre_test: (ctx.pre_test != DoConditionType::None).then_some(ctx.pre_test),
            post_test: (post_test != DoConditionType::None).then_some(post_test),
        });
        self.current = exit_block;
    }

    fn place_repeat(&mut self, g: &mut ControlFlowGraph<'ast>) {
        let source = self.current;
        let moved = g.block_mut(source).statements.pop();
        let header = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(header).statements.push(entry);
        }
        g.add_edge(source, header, EdgeKind::Fallthrough, None);
        g.block_mut(header).is_loop_header = true;
        self.repeat_stack.push(RepeatCtx {
            header,
            pending_exits: Vec::new(),
        });
        self.current = header;
    }

    fn place_until(&mut self, g: &mut ControlFlowGraph<'ast>, line: u32) {
        let tip = self.current;
        let moved = g.block_mut(tip).statements.pop();
        let until_block = new_block(g);
        if let Some(entry) = moved {
            g.block_mut(until_block).statements.push(entry);
        }
        g.add_edge(tip, until_block, EdgeKind::Fallthrough, None);

        let Some(ctx) = self.repeat_stack.pop() else {
            self.diagnostics.push(CfgBuildError::new(
                CfgBuildErrorKind::UntilWithoutRepeat,
                line,
                "UNTIL with no open REPEAT",
            ));
            self.current = new_block(g);
            return;
        };

        let exit_block = new_block(g);
        g.add_edge(until_block, exit_block, EdgeKind::Conditional, Some("true"));
        g.add_edge(
            until_block,
            ctx.header,
            EdgeKind::Conditional,
            Some("false"),
        );
        for pending in &ctx.pending_exits {
            g.add_edge(*pending, exit_block, EdgeKind::Unconditional, None);
        }

        g.repeat_loops.push(RepeatLoopInfo {
            header_block: ctx.header,
            until_block,
            exit_block,
        });
        self.current = exit_block;
    }

    fn place_case(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        when_clauses: &'ast [CaseWhenClause],
        otherwise: &'ast Option<Vec<Statement>>,
        line: u32,
    ) {
        let select_block = self.current;
        let mut test_blocks = Vec::new();
        let mut body_blocks = Vec::new();
        let mut body_tips: Vec<(u32, bool)> = Vec::new();

        for clause in when_clauses {
            let test_block = new_block(g);
            test_blocks.push(test_block);
            let body_block = new_block(g);
            body_blocks.push(body_block);
            self.current = body_block;
            let ended = self.build_stmt_list(g, &clause.statements, line);
            body_tips.push((self.current, ended));
        }

        let else_block = if let Some(stmts) = otherwise {
            let eb = new_block(g);
            self.current = eb;
            let ended = self.build_stmt_list(g, stmts, line);
            body_tips.push((self.current, ended));
            Some(eb)
        } else {
            None
        };

        let exit_block = new_block(g);

        match test_blocks.first() {
            Some(&first) => g.add_edge(select_block, first, EdgeKind::Fallthrough, None),
            None => {
                let target = else_block.unwrap_or(exit_block);
                g.add_edge(select_block, target, EdgeKind::Fallthrough, None);
            }
        }

        for (i, &test_block) in test_blocks.iter().enumerate() {
            g.add_edge(
                test_block,
                body_blocks[i],
                EdgeKind::Conditional,
                Some("true"),
            );
            let next_target = test_blocks
                .get(i + 1)
                .copied()
                .or(else_block)
                .unwrap_or(exit_block);
            g.add_edge(test_block, next_target, EdgeKind::Conditional, Some("false"));
        }

        for (tip, ended) in &body_tips {
            if !*ended {
                g.add_edge(*tip, exit_block, EdgeKind::Unconditional, None);
            }
        }

        g.select_cases.push(SelectCaseInfo {
            select_block,
            test_blocks,
            body_blocks,
            else_block,
            exit_block,
        });
        self.current = exit_block;
    }

    fn place_try(
        &mut self,
        g: &mut ControlFlowGraph<'ast>,
        try_stmts: &'ast [Statement],
        catches: &'ast [CatchClause],
        finally: &'ast Option<Vec<Statement>>,
        line: u32,
    ) {
        let setup_block = self.current;
        let try_block = new_block(g);
        let dispatch_block = new_block(g);
        self.current = try_block;
        let try_ended = self.build_stmt_list(g, try_stmts, line);
        let try_tip = self.current;

        let mut catch_blocks = Vec::new();
        let mut catch_tips = Vec::new();
        for clause in catches {
            let cb = new_block(g);
            catch_blocks.push(cb);
            self.current = cb;
            let ended = self.build_stmt_list(g, &clause.block, line);
            catch_tips.push((self.current, ended));
        }

        let (finally_block, finally_tip, finally_ended) = if let Some(fstmts) = finally {
            let fb = new_block(g);
            self.current = fb;
            let ended = self.build_stmt_list(g, fstmts, line);
            (Some(fb), Some(self.current), ended)
        } else {
            (None, None, false)
        };

        let exit_block = new_block(g);

        g.add_edge(setup_block, try_block, EdgeKind::Conditional, Some("normal"));
        g.add_edge(
            setup_block,
            dispatch_block,
            EdgeKind::Conditional,
            Some("exception"),
        );

        let post_body_target = finally_block.unwrap_or(exit_block);
        if !try_ended {
            g.add_edge(try_tip, post_body_target, EdgeKind::Unconditional, None);
        }
        for (&cb, &(tip, ended)) in catch_blocks.iter().zip(catch_tips.iter()) {
            g.add_edge(dispatch_block, cb, EdgeKind::Conditional, Some("exception"));
            if !ended {
                g.add_edge(tip, post_body_target, EdgeKind::Unconditional, None);
            }
        }
        if let Some(ft) = finally_tip {
            if !finally_ended {
                g.add_edge(ft, exit_block, EdgeKind::Unconditional, None);
            }
        }

        g.try_blocks.push(TryInfo {
            setup_block,
            try_block,
            try_tip,
            try_ended,
            dispatch_block,
            catch_blocks,
            catch_tips,
            finally_block,
            finally_tip,
            finally_ended,
            exit_block,
        });
        self.current = exit_block;
    }
}

fn resolve_target(g: &ControlFlowGraph, symbols: &SymbolTable, target: &JumpTarget) -> Option<u32> {
    match target {
        JumpTarget::Line(n) => g.block_for_line_or_next(*n),
        JumpTarget::Label(name) => symbols
            .labels
            .get(name)
            .and_then(|label| g.block_for_line_or_next(label.line)),
    }
}

/// Nearest-preceding-entry heuristic for resolving a bare `RETURN` (used by
/// GOSUB, not by `RETURN expr` inside a function) back to its call site.
/// Spec.md §9 Open Question 2 leaves the exact mechanism to the
/// implementation; a program calling the same subroutine from more than one
/// GOSUB will have every bare RETURN in it resolve to whichever call site's
/// target block id is the greatest one at or before this block — the last
/// one recorded wins when several subroutines start at the same block
/// (they can't) or when block ids tie (they don't, ids are unique).
fn resolve_bare_return(block_id: u32, subroutine_returns: &HashMap<u32, u32>) -> Option<u32> {
    subroutine_returns
        .iter()
        .filter(|&(&entry, _)| entry <= block_id)
        .max_by_key(|&(&entry, _)| entry)
        .map(|(_, &ret)| ret)
}

fn wire_jump_edges<'ast>(
    g: &mut ControlFlowGraph<'ast>,
    symbols: &SymbolTable,
    diagnostics: &mut Vec<CfgBuildError>,
) {
    let block_count = g.blocks.len() as u32;
    let mut subroutine_returns: HashMap<u32, u32> = HashMap::new();

    for id in 0..block_count {
        let tail = g.block(id).statements.last().map(|e| e.statement);
        match tail {
            Some(Statement::Gosub(target)) => {
                let Some(&ret) = g.gosub_return_map.get(&id) else {
                    continue;
                };
                match resolve_target(g, symbols, target) {
                    Some(dest) => {
                        g.add_edge(id, dest, EdgeKind::Call, None);
                        g.add_edge(id, ret, EdgeKind::Fallthrough, None);
                        subroutine_returns.insert(dest, ret);
                    }
                    None => {
                        diagnostics.push(CfgBuildError::new(
                            CfgBuildErrorKind::UnresolvedJumpTarget,
                            g.block(id).statements.last().map(|e| e.line).unwrap_or(0),
                            "GOSUB target does not resolve to any line",
                        ));
                        g.add_edge(id, ret, EdgeKind::Fallthrough, None);
                    }
                }
            }
            Some(Statement::OnGosub { targets, .. }) => {
                let Some(&ret) = g.gosub_return_map.get(&id) else {
                    continue;
                };
                if targets.is_empty() {
                    diagnostics.push(CfgBuildError::new(
                        CfgBuildErrorKind::EmptyOnList,
                        g.block(id).statements.last().map(|e| e.line).unwrap_or(0),
                        "ON GOSUB with no targets",
                    ));
                }
                for (i, target) in targets.iter().enumerate() {
                    if let Some(dest) = resolve_target(g, symbols, target) {
                        g.add_edge(id, dest, EdgeKind::Call, Some(&(i + 1).to_string()));
                        subroutine_returns.insert(dest, ret);
                    }
                }
                g.add_edge(id, ret, EdgeKind::Fallthrough, None);
            }
            _ => {}
        }
    }

    for id in 0..block_count {
        if !g.block(id).successors.is_empty() {
            continue;
        }
        let tail_line = g.block(id).statements.last().map(|e| e.line).unwrap_or(0);
        let tail = g.block(id).statements.last().map(|e| e.statement);
        match tail {
            Some(Statement::Goto(target)) => match resolve_target(g, symbols, target) {
                Some(dest) => g.add_edge(id, dest, EdgeKind::Unconditional, None),
                None => diagnostics.push(CfgBuildError::new(
                    CfgBuildErrorKind::UnresolvedJumpTarget,
                    tail_line,
                    "GOTO target does not resolve to any line",
                )),
            },
            Some(Statement::OnGoto { targets, .. }) => {
                if targets.is_empty() {
                    diagnostics.push(CfgBuildError::new(
                        CfgBuildErrorKind::EmptyOnList,
                        tail_line,
                        "ON GOTO with no targets",
                    ));
                }
                for (i, target) in targets.iter().enumerate() {
                    if let Some(dest) = resolve_target(g, symbols, target) {
                        g.add_edge(id, dest, EdgeKind::Conditional, Some(&(i + 1).to_string()));
                    }
                }
                if id + 1 < block_count {
                    g.add_edge(id, id + 1, EdgeKind::Fallthrough, None);
                }
            }
            Some(Statement::OnEvent { handler, target, .. }) => {
                match resolve_target(g, symbols, target) {
                    Some(dest) => {
                        let kind = if *handler == EventHandlerKind::Gosub {
                            EdgeKind::Call
                        } else {
                            EdgeKind::Unconditional
                        };
                        g.add_edge(id, dest, kind, Some("event"));
                    }
                    None => diagnostics.push(CfgBuildError::new(
                        CfgBuildErrorKind::UnresolvedJumpTarget,
                        tail_line,
                        "ON EVENT target does not resolve to any line",
                    )),
                }
                if id + 1 < block_count {
                    g.add_edge(id, id + 1, EdgeKind::Fallthrough, None);
                }
            }
            Some(Statement::If {
                has_goto: true,
                goto_target: Some(target),
                ..
            }) => {
                match resolve_target(g, symbols, target) {
                    Some(dest) => g.add_edge(id, dest, EdgeKind::Conditional, Some("true")),
                    None => diagnostics.push(CfgBuildError::new(
                        CfgBuildErrorKind::UnresolvedJumpTarget,
                        tail_line,
                        "single-line IF...GOTO target does not resolve to any line",
                    )),
                }
                if id + 1 < block_count {
                    g.add_edge(id, id + 1, EdgeKind::Conditional, Some("false"));
                }
            }
            Some(Statement::Return(_)) if g.function.is_some() => {
                g.add_edge(id, g.exit_block, EdgeKind::Return, None);
            }
            Some(Statement::End) => {
                g.add_edge(id, g.exit_block, EdgeKind::Return, None);
            }
            Some(Statement::Exit(ExitKind::Function)) | Some(Statement::Exit(ExitKind::Sub)) => {
                g.add_edge(id, g.exit_block, EdgeKind::Return, None);
            }
            Some(Statement::Return(_)) => match resolve_bare_return(id, &subroutine_returns) {
                Some(ret) => g.add_edge(id, ret, EdgeKind::Return, None),
                None => {
                    diagnostics.push(CfgBuildError::new(
                        CfgBuildErrorKind::ReturnWithoutGosub,
                        tail_line,
                        "RETURN with no GOSUB known to reach this point",
                    ));
                    g.add_edge(id, g.exit_block, EdgeKind::Return, None);
                }
            },
            Some(Statement::Throw(_)) => {
                // Exception propagation is a runtime concern; no static edge.
            }
            Some(Statement::Exit(_)) => {
                // EXIT FOR/DO/WHILE already wired when their loop closed.
            }
            Some(Statement::If { has_goto: false, .. }) => {
                // Multi-line/inline IF: already wired while building it.
            }
            _ => {
                if id + 1 < block_count {
                    g.add_edge(id, id + 1, EdgeKind::Fallthrough, None);
                }
            }
        }
    }
}

/// A block's last emitted branch determines its terminator category at
/// codegen time (spec.md §3 invariant 1); blocks with more than one
/// successor, or whose single successor isn't a plain fallthrough, need an
/// explicit branch instruction rather than falling off the end.
fn finalize_terminators(g: &mut ControlFlowGraph) {
    let mut non_fallthrough: HashSet<u32> = HashSet::new();
    for edge in &g.edges {
        if edge.kind != EdgeKind::Fallthrough {
            non_fallthrough.insert(edge.from);
        }
    }
    for block in &mut g.blocks {
        if block.successors.len() != 1 || non_fallthrough.contains(&block.id) {
            block.is_terminator = true;
        }
    }
}

fn identify_subroutines(g: &mut ControlFlowGraph) {
    let targets: Vec<u32> = g
        .edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Call)
        .map(|e| e.to)
        .collect();
    for target in targets {
        g.block_mut(target).is_subroutine = true;
    }
}

/// Phase 5 (optional): an empty block with exactly one unlabeled
/// fallthrough/unconditional successor contributes nothing but an extra
/// hop. Rather than renumber ids (which every aux structure and
/// `line_number_to_block` entry references), predecessors are redirected
/// straight to the successor and the empty block is left orphaned — dead
/// weight the code generator already skips (no predecessors, not the entry
/// block).
fn merge_noop_blocks(g: &mut ControlFlowGraph) {
    let entry = g.entry_block;
    let exit = g.exit_block;
    let mut retarget: HashMap<u32, u32> = HashMap::new();

    for block in &g.blocks {
        if block.id == entry || block.id == exit {
            continue;
        }
        if !block.is_empty() || block.is_loop_header || block.is_subroutine || block.label.is_some() {
            continue;
        }
        if block.successors.len() != 1 {
            continue;
        }
        let only_edge = g
            .edges
            .iter()
            .filter(|e| e.from == block.id)
            .collect::<Vec<_>>();
        if only_edge.len() != 1 {
            continue;
        }
        let edge = only_edge[0];
        if edge.kind == EdgeKind::Conditional || edge.kind == EdgeKind::Call {
            continue;
        }
        retarget.insert(block.id, edge.to);
    }

    if retarget.is_empty() {
        return;
    }

    // Follow chains of merged blocks to their ultimate surviving target.
    let resolve = |mut id: u32, retarget: &HashMap<u32, u32>| -> u32 {
        let mut seen = HashSet::new();
        while let Some(&next) = retarget.get(&id) {
            if !seen.insert(id) {
                break;
            }
            id = next;
        }
        id
    };

    for edge in &mut g.edges {
        if retarget.contains_key(&edge.to) && edge.from != edge.to {
            edge.to = resolve(edge.to, &retarget);
        }
    }

    let ids: Vec<u32> = g.blocks.iter().map(|b| b.id).collect();
    for id in ids {
        let successors = g.block(id).successors.clone();
        let mut new_successors = smallvec::SmallVec::<[u32; 2]>::new();
        for s in successors {
            let target = if retarget.contains_key(&s) {
                resolve(s, &retarget)
            } else {
                s
            };
            if !new_successors.contains(&target) {
                new_successors.push(target);
            }
        }
        g.block_mut(id).successors = new_successors;
    }

    for (&merged, _) in &retarget {
        g.block_mut(merged).successors.clear();
    }

    for block in &mut g.blocks {
        let preds = std::mem::take(&mut block.predecessors);
        let mut fixed = smallvec::SmallVec::<[u32; 2]>::new();
        for p in preds {
            if !retarget.contains_key(&p) && !fixed.contains(&p) {
                fixed.push(p);
            }
        }
        block.predecessors = fixed;
    }
    for block in &g.blocks {
        // rebuilt below from edges to stay consistent with `add_edge`'s
        // invariant after the retargeting above.
        let _ = block;
    }
    let edges_snapshot = g.edges.clone();
    for block in &mut g.blocks {
        block.predecessors.clear();
    }
    for edge in &edges_snapshot {
        if !g.block(edge.to).predecessors.contains(&edge.from) {
            g.block_mut(edge.to).predecessors.push(edge.from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Line, LValue, Program};

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn program(lines: Vec<Line>) -> Program {
        Program { lines }
    }

    #[test]
    fn if_then_else_creates_merge_after_both_branches() {
        let prog = program(vec![
            Line {
                line_number: 10,
                statements: vec![Statement::If {
                    condition: Expression::Binary {
                        left: Box::new(var("X")),
                        op: BinOp::Gt,
                        right: Box::new(Expression::IntLiteral(0)),
                    },
                    then_statements: vec![Statement::Let {
                        target: LValue::Variable("A".into()),
                        value: Expression::IntLiteral(1),
                    }],
                    else_statements: vec![Statement::Let {
                        target: LValue::Variable("A".into()),
                        value: Expression::IntLiteral(2),
                    }],
                    has_goto: false,
                    goto_target: None,
                    is_multi_line: true,
                }],
            },
            Line {
                line_number: 20,
                statements: vec![Statement::End],
            },
        ]);
        let symbols = SymbolTable::new();
        let (program_cfg, diags) =
            build_program_cfg(&prog, &symbols, &CfgBuildOptions::default());
        assert!(diags.is_empty());
        let g = &program_cfg.main;
        assert!(g.predecessors_match_successors());
        // then_block and else_block both created before merge_block.
        let cond = g.block(g.entry_block);
        assert_eq!(cond.successors.len(), 2);
    }

    #[test]
    fn for_next_wires_check_body_and_exit() {
        let prog = program(vec![
            Line {
                line_number: 10,
                statements: vec![Statement::For {
                    variable: "I".into(),
                    start: Expression::IntLiteral(1),
                    end: Expression::IntLiteral(10),
                    step: None,
                }],
            },
            Line {
                line_number: 20,
                statements: vec![Statement::Next { variable: Some("I".into()) }],
            },
        ]);
        let symbols = SymbolTable::new();
        let (program_cfg, diags) =
            build_program_cfg(&prog, &symbols, &CfgBuildOptions::default());
        assert!(diags.is_empty());
        let g = &program_cfg.main;
        assert_eq!(g.for_loops.len(), 1);
        let info = &g.for_loops[0];
        assert!(g.block(info.check_block).successors.contains(&info.body_block));
        assert!(g.block(info.check_block).successors.contains(&info.exit_block));
        assert!(info.exit_block > info.body_block);
        assert!(g.predecessors_match_successors());
    }

    #[test]
    fn goto_resolves_forward_reference() {
        let prog = program(vec![
            Line {
                line_number: 10,
                statements: vec![Statement::Goto(JumpTarget::Line(30))],
            },
            Line {
                line_number: 20,
                statements: vec![Statement::End],
            },
            Line {
                line_number: 30,
                statements: vec![Statement::End],
            },
        ]);
        let symbols = SymbolTable::new();
        let (program_cfg, diags) =
            build_program_cfg(&prog, &symbols, &CfgBuildOptions::default());
        assert!(diags.is_empty());
        let g = &program_cfg.main;
        let target_block = *g.line_number_to_block.get(&30).unwrap();
        assert!(g.block(g.entry_block).successors.contains(&target_block));
    }

    #[test]
    fn gosub_return_round_trips() {
        let prog = program(vec![
            Line {
                line_number: 10,
                statements: vec![Statement::Gosub(JumpTarget::Line(100))],
            },
            Line {
                line_number: 20,
                statements: vec![Statement::End],
            },
            Line {
                line_number: 100,
                statements: vec![Statement::Return(None)],
            },
        ]);
        let symbols = SymbolTable::new();
        let (program_cfg, diags) =
            build_program_cfg(&prog, &symbols, &CfgBuildOptions::default());
        assert!(diags.is_empty());
        let g = &program_cfg.main;
        let call_edge = g.edges.iter().find(|e| e.kind == EdgeKind::Call).unwrap();
        let return_edge = g.edges.iter().find(|e| e.kind == EdgeKind::Return).unwrap();
        assert_eq!(call_edge.to, return_edge.from);
    }

    #[test]
    fn while_wend_loop_back_edge() {
        let prog = program(vec![
            Line {
                line_number: 10,
                statements: vec![Statement::While {
                    condition: Expression::Binary {
                        left: Box::new(var("X")),
                        op: BinOp::Lt,
                        right: Box::new(Expression::IntLiteral(10)),
                    },
                }],
            },
            Line {
                line_number: 20,
                statements: vec![Statement::Wend],
            },
        ]);
        let symbols = SymbolTable::new();
        let (program_cfg, diags) =
            build_program_cfg(&prog, &symbols, &CfgBuildOptions::default());
        assert!(diags.is_empty());
        let g = &program_cfg.main;
        assert_eq!(g.while_loops.len(), 1);
        let info = &g.while_loops[0];
        assert!(g.block(info.wend_block).successors.contains(&info.header_block));
        assert!(info.exit_block > info.header_block);
    }
}
