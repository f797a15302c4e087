//! Control-flow graph data model (spec.md §3 "Control-flow entities").
//!
//! Blocks reference each other by id only — there is no cyclic ownership
//! (spec.md §9 "Cyclic CFG data"). `ControlFlowGraph` owns its blocks;
//! blocks own nothing but borrow their statements from the `Program` they
//! were built from, per spec.md §3 invariant "statements are borrowed from
//! the AST (never copied)".

pub mod builder;
pub mod constructs;
pub mod error;
pub mod loop_analysis;
pub mod report;

use crate::ast::{Expression, Statement};
use crate::cfg::constructs::{
    DoLoopInfo, ForLoopInfo, RepeatLoopInfo, SelectCaseInfo, TryInfo, WhileLoopInfo,
};
use crate::types::VariableType;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A statement plus the source line it was read from, as placed into a
/// block by Phase 1 of the builder.
#[derive(Debug, Clone, Copy)]
pub struct StatementEntry<'ast> {
    pub statement: &'ast Statement,
    pub line: u32,
}

/// Kind of transition a [`CFGEdge`] represents (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Ordinary "ran off the end of a block" edge to `current+1`.
    Fallthrough,
    /// One of a pair of branch edges (true/false, or a CASE test).
    Conditional,
    /// GOTO, WEND/LOOP/UNTIL/NEXT back edges, IF-with-GOTO taken edge, etc.
    Unconditional,
    /// GOSUB / function call edge: caller block to callee entry.
    Call,
    /// RETURN / END / EXIT FUNCTION|SUB edge into a function's exit block.
    Return,
}

/// A directed edge between two blocks, labeled per spec.md §3 ("true",
/// "false", a case index, or "exception").
#[derive(Debug, Clone)]
pub struct CFGEdge {
    pub from: u32,
    pub to: u32,
    pub kind: EdgeKind,
    pub label: Option<String>,
}

/// A maximal straight-line sequence of statements with a single entry and
/// exit by control flow (spec.md Glossary).
#[derive(Debug, Clone)]
pub struct BasicBlock<'ast> {
    pub id: u32,
    pub label: Option<String>,
    pub statements: Vec<StatementEntry<'ast>>,
    /// Most blocks have at most two successors (fallthrough/taken, or the
    /// true/false pair of a conditional); `SmallVec` keeps those inline.
    pub successors: SmallVec<[u32; 2]>,
    pub predecessors: SmallVec<[u32; 2]>,
    pub is_loop_header: bool,
    pub is_loop_exit: bool,
    pub is_subroutine: bool,
    pub is_terminator: bool,
}

impl<'ast> BasicBlock<'ast> {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            label: None,
            statements: Vec::new(),
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            is_loop_header: false,
            is_loop_exit: false,
            is_subroutine: false,
            is_terminator: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn push(&mut self, statement: &'ast Statement, line: u32) {
        self.statements.push(StatementEntry { statement, line });
    }
}

/// Function metadata attached to a [`ControlFlowGraph`] that belongs to a
/// FUNCTION/SUB/DEF-FN callee rather than the main program.
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    pub name: String,
    pub parameters: Vec<(String, VariableType)>,
    pub return_type: VariableType,
    pub is_sub: bool,
}

/// One function's (or the main program's) control-flow graph.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph<'ast> {
    pub blocks: Vec<BasicBlock<'ast>>,
    pub edges: Vec<CFGEdge>,
    pub entry_block: u32,
    pub exit_block: u32,
    /// Resolves a BASIC line number to the block id that begins it, with
    /// the "or next defined line" fallback of spec.md §3 invariant 5.
    pub line_number_to_block: BTreeMap<u32, u32>,
    pub function: Option<FunctionMeta>,
    /// Blocks that are GOSUB return continuations (spec.md §4.1 "RETURN
    /// ... restrict RETURN fan-in").
    pub gosub_return_blocks: HashSet<u32>,
    /// caller block id -> return-continuation block id (spec.md §4.1 GOSUB).
    pub gosub_return_map: HashMap<u32, u32>,
    /// NEXT block id -> its FOR's check block id (spec.md §4.1.2).
    pub next_to_header: HashMap<u32, u32>,

    /// Auxiliary structures describing recognized constructs, consumed by
    /// Phase 2 edge building and by the code generator's statement
    /// emission (spec.md §3 "auxiliary structures ... see §4.1").
    pub for_loops: Vec<ForLoopInfo<'ast>>,
    pub while_loops: Vec<WhileLoopInfo>,
    pub do_loops: Vec<DoLoopInfo>,
    pub repeat_loops: Vec<RepeatLoopInfo>,
    pub select_cases: Vec<SelectCaseInfo>,
    pub try_blocks: Vec<TryInfo>,
}

impl<'ast> ControlFlowGraph<'ast> {
    pub(crate) fn new() -> Self {
        Self {
            blocks: Vec::new(),
            edges: Vec::new(),
            entry_block: 0,
            exit_block: 0,
            line_number_to_block: BTreeMap::new(),
            function: None,
            gosub_return_blocks: HashSet::new(),
            gosub_return_map: HashMap::new(),
            next_to_header: HashMap::new(),
            for_loops: Vec::new(),
            while_loops: Vec::new(),
            do_loops: Vec::new(),
            repeat_loops: Vec::new(),
            select_cases: Vec::new(),
            try_blocks: Vec::new(),
        }
    }

    pub fn block(&self, id: u32) -> &BasicBlock<'ast> {
        &self.blocks[id as usize]
    }

    pub fn block_mut(&mut self, id: u32) -> &mut BasicBlock<'ast> {
        &mut self.blocks[id as usize]
    }

    /// Exact line lookup, falling back to the next greater defined line
    /// (spec.md §3 invariant 5, §4.1 Phase 2 `getBlockForLineOrNext`).
    pub fn block_for_line_or_next(&self, line: u32) -> Option<u32> {
        if let Some(&id) = self.line_number_to_block.get(&line) {
            return Some(id);
        }
        self.line_number_to_block
            .range(line..)
            .next()
            .map(|(_, &id)| id)
    }

    pub(crate) fn add_edge(&mut self, from: u32, to: u32, kind: EdgeKind, label: Option<&str>) {
        self.edges.push(CFGEdge {
            from,
            to,
            kind,
            label: label.map(str::to_owned),
        });
        if !self.block(from).successors.contains(&to) {
            self.block_mut(from).successors.push(to);
        }
        if !self.block(to).predecessors.contains(&from) {
            self.block_mut(to).predecessors.push(from);
        }
    }

    /// Testable property 3 (spec.md §8):
    /// `predecessors(V) = {U : V ∈ successors(U)}`.
    pub fn predecessors_match_successors(&self) -> bool {
        for block in &self.blocks {
            for &pred in &block.predecessors {
                if !self.block(pred).successors.contains(&block.id) {
                    return false;
                }
            }
            for &succ in &block.successors {
                if !self.block(succ).predecessors.contains(&block.id) {
                    return false;
                }
            }
        }
        true
    }
}

/// A `DEF FNname(params) = expr` body. These get no CFG of their own
/// (spec.md §4.1 Phase 1 "FUNCTION/SUB/DEF ... DEF FN bodies are a single
/// expression"); the code generator lowers the expression directly in the
/// caller's context rather than emitting a callable QBE function.
#[derive(Debug, Clone, Copy)]
pub struct DefFnInfo<'ast> {
    pub parameters: &'ast [crate::ast::Param],
    pub body: &'ast Expression,
}

/// The whole program's control-flow graphs: the main program plus one per
/// user FUNCTION/SUB/DEF-FN (spec.md §3).
#[derive(Debug, Clone)]
pub struct ProgramCFG<'ast> {
    pub main: ControlFlowGraph<'ast>,
    pub functions: HashMap<String, ControlFlowGraph<'ast>>,
    /// DEF FN bodies, keyed by name, for the code generator to inline
    /// (spec.md §4.1 Phase 1 DEF note).
    pub def_functions: HashMap<String, DefFnInfo<'ast>>,
}

impl<'ast> ProgramCFG<'ast> {
    pub fn cfg_for(&self, name: &str) -> Option<&ControlFlowGraph<'ast>> {
        self.functions.get(name)
    }

    pub fn all_cfgs(&self) -> impl Iterator<Item = &ControlFlowGraph<'ast>> {
        std::iter::once(&self.main).chain(self.functions.values())
    }
}
