//! The C runtime ABI consumed by generated code (spec.md §6 "Runtime ABI
//! consumed"). The runtime itself is out of scope; this module only emits
//! `extern` declarations so QBE (and whatever assembles/links its output)
//! knows these symbols exist. Declarations are grounded on the same
//! "static table, stringly-named, preamble-emitted" shape as the teacher's
//! `target.rs` extern surface.

/// One external function's name and QBE type signature, as it appears in
/// the preamble comment block spec.md §4.2 describes.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeFn {
    pub name: &'static str,
    pub params: &'static str,
    pub returns: &'static str,
}

macro_rules! rtfn {
    ($name:literal, $params:literal, $returns:literal) => {
        RuntimeFn {
            name: $name,
            params: $params,
            returns: $returns,
        }
    };
}

/// Every runtime entry point spec.md §6 lists, in the order they're most
/// naturally reached for (lifecycle, then I/O, then strings, then arrays,
/// then conversions, then math).
pub const RUNTIME_FUNCTIONS: &[RuntimeFn] = &[
    rtfn!("basic_init", "", ""),
    rtfn!("basic_cleanup", "", ""),
    rtfn!("basic_print_int", "w", ""),
    rtfn!("basic_print_double", "d", ""),
    rtfn!("basic_print_string", "l", ""),
    rtfn!("basic_print_newline", "", ""),
    rtfn!("basic_print_tab", "", ""),
    rtfn!("basic_input_int", "", "w"),
    rtfn!("basic_input_double", "", "d"),
    rtfn!("basic_input_line", "", "l"),
    rtfn!("string_desc_alloc", "", "l"),
    rtfn!("string_desc_release", "l", ""),
    rtfn!("string_retain", "l", "l"),
    rtfn!("str_concat", "l, l", "l"),
    rtfn!("str_length", "l", "l"),
    rtfn!("str_substr", "l, l, l", "l"),
    rtfn!("str_compare", "l, l", "w"),
    rtfn!("string_get_char_at", "l, l", "w"),
    rtfn!("string_set_char_at", "l, l, w", ""),
    rtfn!("string_promote_to_utf32", "l", ""),
    rtfn!("basic_chr", "w", "l"),
    rtfn!("basic_asc", "l", "w"),
    rtfn!("basic_val", "l", "d"),
    rtfn!("basic_strtype", "l", "w"),
    rtfn!("basic_ucase", "l", "l"),
    rtfn!("basic_lcase", "l", "l"),
    rtfn!("basic_trim", "l", "l"),
    rtfn!("basic_ltrim", "l", "l"),
    rtfn!("basic_rtrim", "l", "l"),
    rtfn!("basic_space", "w", "l"),
    rtfn!("basic_string_repeat", "w, l", "l"),
    rtfn!("basic_instr", "l, l, w", "w"),
    rtfn!("basic_sgn", "d", "w"),
    rtfn!("basic_fix", "d", "w"),
    rtfn!("basic_cint", "d", "w"),
    rtfn!("basic_int", "d", "w"),
    rtfn!("basic_rnd", "d", "d"),
    rtfn!("basic_csrlin", "", "w"),
    rtfn!("basic_pos", "w", "w"),
    rtfn!("basic_err", "", "w"),
    rtfn!("basic_erl", "", "w"),
    rtfn!("basic_abs", "d, d", "d"),
    rtfn!("basic_min", "d, d", "d"),
    rtfn!("basic_max", "d, d", "d"),
    rtfn!("array_create", "w, ...", "l"),
    rtfn!("array_get_int", "l, w", "w"),
    rtfn!("array_get_double", "l, w", "d"),
    rtfn!("array_get_string", "l, w", "l"),
    rtfn!("array_set_int", "l, w, w", ""),
    rtfn!("array_set_double", "l, w, d", ""),
    rtfn!("array_set_string", "l, w, l", ""),
    rtfn!("array_redim", "l, ...", "l"),
    rtfn!("array_erase", "l", ""),
    rtfn!("array_lbound", "l, w", "w"),
    rtfn!("array_ubound", "l, w", "w"),
    rtfn!("basic_check_bounds", "w, w, w", ""),
    rtfn!("int_to_str", "w", "l"),
    rtfn!("double_to_str", "d", "l"),
    rtfn!("str_to_int", "l", "w"),
    rtfn!("str_to_double", "l", "d"),
    rtfn!("basic_sqrt", "d", "d"),
    rtfn!("basic_string_bounds_error", "l, l, l", ""),
];

/// Renders the `extern`-equivalent QBE preamble: one comment line per
/// runtime function naming its signature (QBE itself has no `extern`
/// keyword — declaring intent this way matches how the teacher's IR
/// lowering documents ABI expectations inline above `call` sites it emits).
pub fn render_preamble_comment() -> String {
    let mut out = String::from("# runtime ABI consumed (declared for reference, not emitted as QBE syntax):\n");
    for f in RUNTIME_FUNCTIONS {
        out.push_str(&format!("#   {}({}) -> {}\n", f.name, f.params, f.returns));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_runtime_function_has_a_name() {
        assert!(RUNTIME_FUNCTIONS.iter().all(|f| !f.name.is_empty()));
    }
}
