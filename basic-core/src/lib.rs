//! AST-to-QBE middle and back end for a classic BASIC dialect.
//!
//! Three stages live here, each a thin module boundary around a single
//! concern: [`cfg`] turns a parsed [`ast::Program`] into one control-flow
//! graph per function (plus the main program), [`codegen`] walks those
//! graphs and emits QBE intermediate-language text, and [`pipeline`] wires
//! the two together for callers that just want IL out of a `Program` in.
//! Lexing, parsing, semantic analysis, the QBE backend proper, and the C
//! runtime the generated calls target are all external collaborators.

pub mod ast;
pub mod cfg;
pub mod codegen;
pub mod diagnostics;
pub mod pipeline;
pub mod symbols;
pub mod types;

pub use diagnostics::Diagnostics;
pub use pipeline::{compile, compile_verbose, CompileOutput, PipelineOptions, PipelineStats};
