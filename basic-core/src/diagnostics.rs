//! Non-fatal diagnostic accumulation (spec.md §7 "Propagation").
//!
//! The CFG builder and code generator both tolerate most structural and
//! name-resolution problems rather than aborting outright, so a build can
//! come back with a finished artifact *and* a list of things that went
//! sideways along the way. `Diagnostics` is the single place the pipeline
//! collects both families so a driver (the CLI, or a future IDE
//! integration) can report them together, the way
//! `gcrecomp_core::recompiler::pipeline` surfaces per-function decode
//! warnings alongside a still-usable `RecompilationOutput`.

use crate::cfg::error::CfgBuildError;
use crate::codegen::CodeGenError;

/// Every non-fatal `CfgBuildError`/`CodeGenError` raised over the course of
/// one [`crate::pipeline::compile`] call.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    cfg_errors: Vec<CfgBuildError>,
    codegen_errors: Vec<CodeGenError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend_cfg(&mut self, errors: Vec<CfgBuildError>) {
        for err in &errors {
            log::warn!("cfg diagnostic: {err}");
        }
        self.cfg_errors.extend(errors);
    }

    pub(crate) fn extend_codegen(&mut self, errors: &[CodeGenError]) {
        for err in errors {
            log::warn!("codegen diagnostic: {err}");
        }
        self.codegen_errors.extend(errors.iter().cloned());
    }

    pub fn cfg_errors(&self) -> &[CfgBuildError] {
        &self.cfg_errors
    }

    pub fn codegen_errors(&self) -> &[CodeGenError] {
        &self.codegen_errors
    }

    pub fn is_empty(&self) -> bool {
        self.cfg_errors.is_empty() && self.codegen_errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cfg_errors.len() + self.codegen_errors.len()
    }

    /// Whether anything accumulated so far should abort the build (spec.md
    /// §7: `EmptyOnList` on the CFG side, `InternalError` on the codegen
    /// side; everything else is carried and reported, not fatal).
    pub fn has_fatal(&self) -> bool {
        self.cfg_errors.iter().any(CfgBuildError::is_fatal)
            || self.codegen_errors.iter().any(CodeGenError::is_fatal)
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for err in &self.cfg_errors {
            writeln!(f, "cfg: {err}")?;
        }
        for err in &self.codegen_errors {
            writeln!(f, "codegen: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::error::CfgBuildErrorKind;

    #[test]
    fn fresh_diagnostics_is_empty_and_not_fatal() {
        let diags = Diagnostics::new();
        assert!(diags.is_empty());
        assert!(!diags.has_fatal());
    }

    #[test]
    fn empty_on_list_is_fatal() {
        let mut diags = Diagnostics::new();
        diags.extend_cfg(vec![CfgBuildError::new(
            CfgBuildErrorKind::EmptyOnList,
            10,
            "ON GOTO with no targets",
        )]);
        assert!(diags.has_fatal());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn tolerated_cfg_error_is_not_fatal() {
        let mut diags = Diagnostics::new();
        diags.extend_cfg(vec![CfgBuildError::new(
            CfgBuildErrorKind::NextWithoutFor,
            10,
            "stray NEXT",
        )]);
        assert!(!diags.has_fatal());
        assert!(!diags.is_empty());
    }
}
