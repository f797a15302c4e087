//! Code generator configuration (spec.md §4.2 "Options govern comment
//! emission, bounds checks on arrays, and whether to emit stats").

#[derive(Debug, Clone, Copy)]
pub struct CodeGenOptions {
    /// Emit a `#`-prefixed comment above each statement's generated
    /// instructions, naming the source line.
    pub emit_comments: bool,
    /// Emit `basic_check_bounds` calls before array element access.
    pub bounds_checks: bool,
    /// Emit a trailing comment block with `PipelineStats`-style counters.
    pub emit_stats: bool,
}

impl Default for CodeGenOptions {
    fn default() -> Self {
        Self {
            emit_comments: true,
            bounds_checks: true,
            emit_stats: false,
        }
    }
}
