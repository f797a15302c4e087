//! Type system for the BASIC dialect.
//!
//! `VariableType` is the semantic type carried by the symbol table and the
//! AST; `TypeDescriptor` is the richer layout-oriented type used only when
//! computing record (TYPE/UDT) field offsets. `QbeType` is the physical QBE
//! base type a value is stored or computed in, which does not always match
//! the semantic type one-to-one (see [`QbeType::for_comparison`] and the
//! array-slot/ intrinsic-return exceptions documented on each function).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Basic semantic type carried end-to-end by the symbol table and AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Integer,
    Long,
    Single,
    Double,
    String,
    /// Named TYPE (record). The name indexes `SymbolTable::types`.
    UserDefined,
}

impl VariableType {
    /// Name-mangling suffix the semantic analyzer appends (spec.md §3 table).
    /// The code generator never re-derives this from a source suffix
    /// character; this exists only so tests can assert the table matches
    /// what a symbol table constructed "as the analyzer would" looks like.
    pub fn mangle_suffix(self) -> &'static str {
        match self {
            VariableType::Integer | VariableType::Long => "_INT",
            VariableType::Single => "_FLOAT",
            VariableType::Double => "_DOUBLE",
            VariableType::String => "_STRING",
            VariableType::UserDefined => "",
        }
    }

    /// The QBE base type a variable of this semantic type is stored in.
    pub fn storage_qbe_type(self) -> QbeType {
        match self {
            VariableType::Integer | VariableType::Long => QbeType::L,
            VariableType::Single | VariableType::Double => QbeType::D,
            VariableType::String | VariableType::UserDefined => QbeType::L,
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, VariableType::String | VariableType::UserDefined)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, VariableType::Single | VariableType::Double)
    }
}

/// Richer type descriptor used only for TYPE (record) field layout, where
/// widths narrower than a QBE word/long and (un)signedness matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Byte,
    UByte,
    Short,
    UShort,
    Integer,
    UInteger,
    Long,
    ULong,
    Single,
    Double,
    Unicode,
    Pointer,
    String,
    /// Nested record, named by `SymbolTable::types` key.
    UserDefined(String),
}

impl TypeDescriptor {
    /// Size in bytes, used for field offset and alignment computation
    /// (spec.md §4.2.6: "natural alignment per field size (1/2/4/8)").
    pub fn size_of(&self, type_sizes: &std::collections::HashMap<String, u32>) -> u32 {
        match self {
            TypeDescriptor::Byte | TypeDescriptor::UByte => 1,
            TypeDescriptor::Short | TypeDescriptor::UShort => 2,
            TypeDescriptor::Integer | TypeDescriptor::UInteger | TypeDescriptor::Single => 4,
            TypeDescriptor::Long
            | TypeDescriptor::ULong
            | TypeDescriptor::Double
            | TypeDescriptor::Unicode
            | TypeDescriptor::Pointer
            | TypeDescriptor::String => 8,
            TypeDescriptor::UserDefined(name) => {
                *type_sizes.get(name).unwrap_or(&8)
            }
        }
    }

    pub fn align_of(&self, type_sizes: &std::collections::HashMap<String, u32>) -> u32 {
        // Natural alignment: every field we support is self-aligned except
        // nested records, whose alignment is their own maximum field size.
        self.size_of(type_sizes).min(8)
    }
}

/// Physical QBE base type. Distinct from `VariableType` because the same
/// semantic INTEGER is `l` when stored in a variable but `w` when loaded
/// from a 32-bit array slot, returned by certain intrinsics, or produced by
/// a comparison (spec.md §3 "QBE type mapping").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QbeType {
    W,
    L,
    S,
    D,
}

impl QbeType {
    pub fn is_integer(self) -> bool {
        matches!(self, QbeType::W | QbeType::L)
    }

    pub fn is_float(self) -> bool {
        matches!(self, QbeType::S | QbeType::D)
    }

    /// Width-of-operand-max rule used for AND/OR/XOR/NOT on word values
    /// (spec.md §3: "if either operand is `l`, result is `l`").
    pub fn widen(self, other: QbeType) -> QbeType {
        match (self, other) {
            (QbeType::L, _) | (_, QbeType::L) => QbeType::L,
            (QbeType::D, _) | (_, QbeType::D) => QbeType::D,
            (QbeType::S, _) | (_, QbeType::S) => QbeType::S,
            _ => QbeType::W,
        }
    }

    /// Comparisons always yield `w` regardless of operand width.
    pub const COMPARISON: QbeType = QbeType::W;
}

impl fmt::Display for QbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QbeType::W => "w",
            QbeType::L => "l",
            QbeType::S => "s",
            QbeType::D => "d",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_table_matches_spec() {
        assert_eq!(VariableType::Integer.mangle_suffix(), "_INT");
        assert_eq!(VariableType::Long.mangle_suffix(), "_INT");
        assert_eq!(VariableType::Single.mangle_suffix(), "_FLOAT");
        assert_eq!(VariableType::Double.mangle_suffix(), "_DOUBLE");
        assert_eq!(VariableType::String.mangle_suffix(), "_STRING");
    }

    #[test]
    fn storage_qbe_types() {
        assert_eq!(VariableType::Integer.storage_qbe_type(), QbeType::L);
        assert_eq!(VariableType::Double.storage_qbe_type(), QbeType::D);
        assert_eq!(VariableType::String.storage_qbe_type(), QbeType::L);
    }

    #[test]
    fn widen_prefers_wider_integer() {
        assert_eq!(QbeType::W.widen(QbeType::L), QbeType::L);
        assert_eq!(QbeType::L.widen(QbeType::W), QbeType::L);
        assert_eq!(QbeType::W.widen(QbeType::W), QbeType::W);
    }
}
