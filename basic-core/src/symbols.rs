//! Symbol table types (spec.md §3, point 1).
//!
//! This is external-input data: in a full pipeline it is produced by the
//! semantic analyzer, name-mangling already applied. The code generator
//! (`codegen::vars`) consults these tables instead of re-deriving anything
//! from a suffix character — see spec.md §3 "The code generator NEVER
//! re-parses suffixes".

use crate::types::{TypeDescriptor, VariableType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableScope {
    Global,
    /// Declared `LOCAL` inside a function body.
    Local,
    /// Declared `SHARED` inside a function body (falls through to global
    /// storage, spec.md §4.2.4 rule 2d).
    Shared,
    /// A FUNCTION/SUB/DEF-FN parameter.
    Parameter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSymbol {
    /// Name as it appears in source, suffix included (e.g. `X%`).
    pub source_name: String,
    /// Canonical mangled storage name (e.g. `X_INT`).
    pub mangled_name: String,
    pub var_type: VariableType,
    pub scope: VariableScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArraySymbol {
    pub source_name: String,
    pub mangled_name: String,
    pub element_type: VariableType,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Function,
    Sub,
    DefFn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSymbol {
    pub name: String,
    pub mangled_name: String,
    pub parameters: Vec<(String, VariableType)>,
    pub return_type: VariableType,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeFieldSymbol {
    pub name: String,
    pub field_type: TypeDescriptor,
}

/// A `TYPE ... END TYPE` record definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSymbol {
    pub name: String,
    pub fields: Vec<TypeFieldSymbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSymbol {
    pub name: String,
    pub line: u32,
}

/// Per-function symbol scope: parameters, LOCALs, and SHAREDs, consulted
/// in the precedence order of spec.md §4.2.4.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionScope {
    pub parameters: Vec<VariableSymbol>,
    pub locals: HashMap<String, VariableSymbol>,
    pub shared: HashSet<String>,
    /// DEF-FN parameters, checked before FUNCTION/SUB parameters
    /// (spec.md §4.2.4 rule 2a precedes 2b).
    pub def_fn_parameters: Vec<VariableSymbol>,
}

impl FunctionScope {
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    pub fn is_shared(&self, name: &str) -> bool {
        self.shared.contains(name)
    }

    pub fn find_parameter(&self, name: &str) -> Option<&VariableSymbol> {
        self.parameters
            .iter()
            .find(|p| p.source_name == name || plain_name(&p.source_name) == plain_name(name))
    }

    pub fn find_def_fn_parameter(&self, name: &str) -> Option<&VariableSymbol> {
        self.def_fn_parameters.iter().find(|p| p.source_name == name)
    }
}

/// Strips a trailing type suffix character, for "exact or plain-name match"
/// parameter lookups (spec.md §4.2.4 rule 2b).
pub fn plain_name(name: &str) -> &str {
    name.trim_end_matches(['%', '&', '!', '#', '$'])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    pub global_variables: HashMap<String, VariableSymbol>,
    pub arrays: HashMap<String, ArraySymbol>,
    pub functions: HashMap<String, FunctionSymbol>,
    pub types: HashMap<String, TypeSymbol>,
    pub labels: HashMap<String, LabelSymbol>,
    pub line_numbers: HashSet<u32>,
    /// Per-function local scope, keyed by function name. The main program
    /// has no entry here; FOR-loop index variables at top level are looked
    /// up via `global_variables` per spec.md §4.2.4 rule 3.
    pub function_scopes: HashMap<String, FunctionScope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope_for(&self, function_name: &str) -> Option<&FunctionScope> {
        self.function_scopes.get(function_name)
    }

    /// "next defined line ≥ target" resolution used by the CFG's
    /// line-number map fallback (spec.md §3 invariant 5). Exposed here too
    /// since out-of-range ON GOTO/ON GOSUB validation needs to know whether
    /// *any* line exists at or after a target.
    pub fn has_line_at_or_after(&self, target: u32) -> bool {
        self.line_numbers.iter().any(|&l| l >= target)
    }
}
