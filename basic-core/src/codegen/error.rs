//! Code generator error taxonomy (spec.md §7).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeGenError {
    /// Unknown variable, array, function, type, or label (spec.md §7
    /// "NameResolutionError" — fatal to the offending block only).
    #[error("name resolution error at line {line}: {detail}")]
    NameResolution { line: u32, detail: String },

    /// Operand of the wrong kind, e.g. a string where a numeric value is
    /// required (spec.md §7 "TypeMismatchError" — fatal).
    #[error("type mismatch at line {line}: {detail}")]
    TypeMismatch { line: u32, detail: String },

    /// A feature spec.md §9 explicitly licenses leaving unimplemented
    /// (ON ERROR GOTO / RESUME, spec.md §9 Open Question 4).
    #[error("unsupported construct at line {line}: {detail}")]
    Unsupported { line: u32, detail: String },

    /// Invariant violation: a block with no id, a negative temp counter,
    /// and similar (spec.md §7 "InternalError" — aborts with exit code 2).
    #[error("internal code generator error: {0}")]
    Internal(String),
}

impl CodeGenError {
    /// Whether this error should abort the whole generation run rather than
    /// being recorded and skipped past (spec.md §7).
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodeGenError::Internal(_))
    }
}
