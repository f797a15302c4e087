//! CFG builder error taxonomy (spec.md §7 "StructuralError").

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgBuildErrorKind {
    /// NEXT without a matching FOR on the loop-context stack.
    NextWithoutFor,
    /// WEND without a matching WHILE.
    WendWithoutWhile,
    /// UNTIL without a matching REPEAT.
    UntilWithoutRepeat,
    /// LOOP without a matching DO.
    LoopWithoutDo,
    /// RETURN with no GOSUB known to reach this point.
    ReturnWithoutGosub,
    /// ON GOTO/ON GOSUB with zero targets.
    EmptyOnList,
    /// GOTO/GOSUB/ON-x target that resolves to no line at or after it.
    UnresolvedJumpTarget,
}

impl std::fmt::Display for CfgBuildErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CfgBuildErrorKind::NextWithoutFor => "NEXT without matching FOR",
            CfgBuildErrorKind::WendWithoutWhile => "WEND without matching WHILE",
            CfgBuildErrorKind::UntilWithoutRepeat => "UNTIL without matching REPEAT",
            CfgBuildErrorKind::LoopWithoutDo => "LOOP without matching DO",
            CfgBuildErrorKind::ReturnWithoutGosub => "RETURN without reachable GOSUB",
            CfgBuildErrorKind::EmptyOnList => "ON GOTO/ON GOSUB with no targets",
            CfgBuildErrorKind::UnresolvedJumpTarget => "jump target does not resolve to any line",
        };
        f.write_str(s)
    }
}

/// A tolerated-or-fatal structural error from the CFG builder.
///
/// Per spec.md §7, the builder prefers to tolerate malformed input (it
/// still emits a fallthrough edge and lets downstream stages report) and
/// only treats [`CfgBuildErrorKind::EmptyOnList`] as hard-fatal to
/// `build()` — the builder has no target to even guess at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at line {line}: {detail}")]
pub struct CfgBuildError {
    pub kind: CfgBuildErrorKind,
    pub line: u32,
    pub detail: String,
}

impl CfgBuildError {
    pub fn new(kind: CfgBuildErrorKind, line: u32, detail: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            detail: detail.into(),
        }
    }

    /// Whether `build()` must abort on this error rather than merely
    /// recording it and carrying on with a fallthrough edge.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, CfgBuildErrorKind::EmptyOnList)
    }
}
