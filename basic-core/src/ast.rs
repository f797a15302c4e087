//! Abstract syntax tree consumed by the CFG builder and code generator.
//!
//! This is an external-input data model in the sense of spec.md §1: the
//! lexer, parser, and semantic analyzer that would produce it are out of
//! scope. The shapes here are the minimum superset spec.md §6 enumerates,
//! realized as tagged enums (the teacher's `IRInstruction`/`Operand` style)
//! rather than a class hierarchy — there is no behavior attached to AST
//! nodes beyond what the CFG builder and code generator do with them.

use crate::types::VariableType;
use serde::{Deserialize, Serialize};

/// A complete program: an ordered sequence of numbered lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub lines: Vec<Line>,
}

/// One numbered source line, holding zero or more colon-separated
/// statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub line_number: u32,
    pub statements: Vec<Statement>,
}

/// An explicit GOTO/GOSUB/ON-x target: either a line number or a named
/// label. Both forms reach the CFG's line-number map; label targets are
/// resolved through `SymbolTable::labels` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpTarget {
    Line(u32),
    Label(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Floating division (`/`); always yields DOUBLE per spec.md §4.2.2.
    Div,
    /// Integer division (`\`).
    IntDiv,
    Mod,
    And,
    Or,
    Xor,
    /// `NOT(A XOR B)` per spec.md §9 Open Question 3.
    Eqv,
    /// `NOT(A) OR B` per spec.md §9 Open Question 3.
    Imp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(
            self,
            BinOp::And | BinOp::Or | BinOp::Xor | BinOp::Eqv | BinOp::Imp
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

/// Expression nodes (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expression {
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    Variable(String),
    ArrayAccess {
        name: String,
        indices: Vec<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinOp,
        right: Box<Expression>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expression>,
    },
    FunctionCall {
        name: String,
        arguments: Vec<Expression>,
    },
    MemberAccess {
        object: Box<Expression>,
        member: String,
    },
    /// `IIF(cond, trueVal, falseVal)`.
    IIf {
        cond: Box<Expression>,
        true_val: Box<Expression>,
        false_val: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintSeparator {
    /// `,` — advances to the next print zone (`basic_print_tab`).
    Comma,
    /// `;` — no separator emitted.
    Semicolon,
    /// End of item list with no trailing separator.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintItem {
    pub expr: Expression,
    pub separator: PrintSeparator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LValue {
    Variable(String),
    ArrayElement { name: String, indices: Vec<Expression> },
    Member { object: Box<LValue>, member: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoConditionType {
    None,
    While,
    Until,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseWhenClause {
    pub values: Vec<CaseValue>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaseValue {
    Value(Expression),
    Range(Expression, Expression),
    Is(BinOp, Expression),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchClause {
    pub error_codes: Vec<i64>,
    pub block: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    ForLoop,
    Function,
    Sub,
    Do,
    While,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventHandlerKind {
    Gosub,
    Goto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub param_type: VariableType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayDecl {
    pub name: String,
    pub dimensions: Vec<Expression>,
    pub element_type: VariableType,
}

/// Statement nodes (spec.md §6). IF carries the three shapes distinguished
/// in spec.md §4.1.1 directly on the variant so the CFG builder can match
/// on `has_goto`/`is_multi_line` without re-deriving them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Print {
        items: Vec<PrintItem>,
        suppress_newline: bool,
    },
    Input {
        prompt: Option<String>,
        targets: Vec<LValue>,
    },
    Let {
        target: LValue,
        value: Expression,
    },
    If {
        condition: Expression,
        then_statements: Vec<Statement>,
        else_statements: Vec<Statement>,
        has_goto: bool,
        goto_target: Option<JumpTarget>,
        is_multi_line: bool,
    },
    For {
        variable: String,
        start: Expression,
        end: Expression,
        step: Option<Expression>,
    },
    Next {
        variable: Option<String>,
    },
    While {
        condition: Expression,
    },
    Wend,
    Do {
        condition_type: DoConditionType,
        condition: Option<Expression>,
    },
    Loop {
        condition_type: DoConditionType,
        condition: Option<Expression>,
    },
    Repeat,
    Until {
        condition: Expression,
    },
    Case {
        selector: Expression,
        when_clauses: Vec<CaseWhenClause>,
        otherwise_statements: Option<Vec<Statement>>,
    },
    TryCatch {
        try_block: Vec<Statement>,
        catch_clauses: Vec<CatchClause>,
        finally_block: Option<Vec<Statement>>,
    },
    Throw(Option<Expression>),
    Goto(JumpTarget),
    Gosub(JumpTarget),
    OnGoto {
        selector: Expression,
        targets: Vec<JumpTarget>,
    },
    OnGosub {
        selector: Expression,
        targets: Vec<JumpTarget>,
    },
    OnEvent {
        event_name: String,
        handler: EventHandlerKind,
        target: JumpTarget,
    },
    Label(String),
    Dim(Vec<ArrayDecl>),
    Return(Option<Expression>),
    End,
    Exit(ExitKind),
    Function {
        name: String,
        parameters: Vec<Param>,
        return_type: VariableType,
        body: Vec<Statement>,
    },
    Sub {
        name: String,
        parameters: Vec<Param>,
        body: Vec<Statement>,
    },
    /// `DEF FNname(params) = expr` — single-expression body, no separate
    /// CFG (inlined or lowered as a trivial one-block function by codegen).
    Def {
        name: String,
        parameters: Vec<Param>,
        body: Expression,
    },
    Local(Vec<String>),
    Shared(Vec<String>),
    Rem(String),
    Call {
        name: String,
        arguments: Vec<Expression>,
    },
}

impl Statement {
    /// Statements that unconditionally end a block and route control flow
    /// away from "the next statement" — used by Phase 1 of the CFG builder
    /// to decide whether a trailing edge to `current+1` would be wrong.
    pub fn is_terminator_statement(&self) -> bool {
        matches!(
            self,
            Statement::Goto(_)
                | Statement::Return(_)
                | Statement::End
                | Statement::Exit(_)
                | Statement::Throw(_)
        )
    }
}
