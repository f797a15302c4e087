//! Built-in function dispatch table (spec.md §4.2.2 "Intrinsics").
//!
//! This module only classifies a name; `codegen::expr` does the actual
//! lowering (argument evaluation, the `call` emission, and applying
//! `ReturnKind::Promoted` against the operand types it already has in
//! hand). Keeping the table name-only, decoupled from emission, mirrors
//! how `runtime_abi` stays a plain data table rather than an emitter.

use crate::types::{QbeType, VariableType};

/// How an intrinsic's result should be typed once the runtime call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Always `w` (SGN, FIX, CINT, INT, CSRLIN, POS, ERR, ERL, INSTR, ASC).
    Word,
    /// Always `l`, i.e. a string descriptor pointer (CHR$, LEFT$, RIGHT$,
    /// MID$, STR$, UCASE$, LCASE$, TRIM$, LTRIM$, RTRIM$, SPACE$, STRING$).
    Long,
    /// Always `l`, but numeric rather than a string descriptor (LEN).
    LongNumeric,
    /// Takes on the (already-promoted) type of its operand(s) (ABS, MIN,
    /// MAX, SQR).
    Promoted,
    /// Always `d` (VAL, RND).
    Double,
}

#[derive(Debug, Clone, Copy)]
pub struct Intrinsic {
    pub name: &'static str,
    pub runtime_fn: &'static str,
    pub returns: ReturnKind,
}

macro_rules! intr {
    ($name:literal, $rt:literal, $ret:expr) => {
        Intrinsic {
            name: $name,
            runtime_fn: $rt,
            returns: $ret,
        }
    };
}

pub const INTRINSICS: &[Intrinsic] = &[
    intr!("LEN", "str_length", ReturnKind::LongNumeric),
    intr!("ASC", "basic_asc", ReturnKind::Word),
    intr!("CHR$", "basic_chr", ReturnKind::Long),
    intr!("VAL", "basic_val", ReturnKind::Double),
    intr!("LEFT$", "str_substr", ReturnKind::Long),
    intr!("RIGHT$", "str_substr", ReturnKind::Long),
    intr!("MID$", "str_substr", ReturnKind::Long),
    intr!("INSTR", "basic_instr", ReturnKind::Word),
    intr!("STR$", "int_to_str", ReturnKind::Long),
    intr!("UCASE$", "basic_ucase", ReturnKind::Long),
    intr!("LCASE$", "basic_lcase", ReturnKind::Long),
    intr!("TRIM$", "basic_trim", ReturnKind::Long),
    intr!("LTRIM$", "basic_ltrim", ReturnKind::Long),
    intr!("RTRIM$", "basic_rtrim", ReturnKind::Long),
    intr!("SPACE$", "basic_space", ReturnKind::Long),
    intr!("STRING$", "basic_string_repeat", ReturnKind::Long),
    intr!("SGN", "basic_sgn", ReturnKind::Word),
    intr!("FIX", "basic_fix", ReturnKind::Word),
    intr!("CINT", "basic_cint", ReturnKind::Word),
    intr!("INT", "basic_int", ReturnKind::Word),
    intr!("RND", "basic_rnd", ReturnKind::Double),
    intr!("CSRLIN", "basic_csrlin", ReturnKind::Word),
    intr!("POS", "basic_pos", ReturnKind::Word),
    intr!("ERR", "basic_err", ReturnKind::Word),
    intr!("ERL", "basic_erl", ReturnKind::Word),
    intr!("ABS", "basic_abs", ReturnKind::Promoted),
    intr!("MIN", "basic_min", ReturnKind::Promoted),
    intr!("MAX", "basic_max", ReturnKind::Promoted),
    intr!("SQR", "basic_sqrt", ReturnKind::Promoted),
    intr!("STRTYPE", "basic_strtype", ReturnKind::Word),
];

pub fn lookup(name: &str) -> Option<&'static Intrinsic> {
    let upper = name.to_ascii_uppercase();
    INTRINSICS.iter().find(|i| i.name == upper)
}

pub fn is_intrinsic(name: &str) -> bool {
    lookup(name).is_some()
}

impl ReturnKind {
    /// The QBE type an intrinsic's call result is typed as, given the
    /// already-promoted operand type for `ReturnKind::Promoted`.
    pub fn qbe_type(self, promoted_operand: VariableType) -> QbeType {
        match self {
            ReturnKind::Word => QbeType::W,
            ReturnKind::Long | ReturnKind::LongNumeric => QbeType::L,
            ReturnKind::Double => QbeType::D,
            ReturnKind::Promoted => promoted_operand.storage_qbe_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("len").is_some());
        assert!(lookup("Len").is_some());
        assert!(lookup("LEN").is_some());
    }

    #[test]
    fn unknown_name_is_not_an_intrinsic() {
        assert!(!is_intrinsic("MYFUNC"));
    }

    #[test]
    fn abs_promotes_to_operand_type() {
        let abs = lookup("ABS").unwrap();
        assert_eq!(abs.returns, ReturnKind::Promoted);
        assert_eq!(
            abs.returns.qbe_type(VariableType::Double),
            QbeType::D
        );
    }
}
