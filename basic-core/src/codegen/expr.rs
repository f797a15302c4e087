//! Expression emission (spec.md §4.2.2): bottom-up lowering of `Expression`
//! into QBE operands, with the two-axis (semantic type, QBE width) type
//! inference and promotion rules the section describes.

use crate::ast::{BinOp, Expression, UnOp};
use crate::codegen::intrinsics::{self, ReturnKind};
use crate::codegen::vars::{self, VarLocation};
use crate::codegen::CodeGenError;
use crate::types::{QbeType, VariableType};

use super::CodeGenerator;

/// An expression's emitted value: the QBE operand text (a temp, a literal,
/// or a global) plus the two types spec.md §4.2.2 needs to keep straight.
#[derive(Debug, Clone)]
pub struct EmittedValue {
    pub operand: String,
    pub var_type: VariableType,
    pub qbe_type: QbeType,
}

impl EmittedValue {
    pub fn new(operand: impl Into<String>, var_type: VariableType, qbe_type: QbeType) -> Self {
        Self {
            operand: operand.into(),
            var_type,
            qbe_type,
        }
    }
}

impl<'a> CodeGenerator<'a> {
    pub(crate) fn emit_expr(&mut self, expr: &Expression, line: u32) -> EmittedValue {
        match expr {
            Expression::IntLiteral(n) => {
                EmittedValue::new(n.to_string(), VariableType::Long, QbeType::L)
            }
            Expression::FloatLiteral(f) => {
                EmittedValue::new(format!("d_{f}"), VariableType::Double, QbeType::D)
            }
            Expression::StringLiteral(s) => self.emit_string_literal(s),
            Expression::Variable(name) => self.emit_variable_read(name, line),
            Expression::ArrayAccess { name, indices } => self.emit_array_read(name, indices, line),
            Expression::Binary { left, op, right } => self.emit_binary(left, *op, right, line),
            Expression::Unary { op, expr } => self.emit_unary(*op, expr, line),
            Expression::FunctionCall { name, arguments } => self.emit_call(name, arguments, line),
            Expression::MemberAccess { object, member } => {
                self.emit_member_access(object, member, line)
            }
            Expression::IIf {
                cond,
                true_val,
                false_val,
            } => self.emit_iif(cond, true_val, false_val, line),
        }
    }

    fn emit_string_literal(&mut self, text: &str) -> EmittedValue {
        let label = self.literals.intern(text);
        let t = self.new_temp();
        self.emit(&format!("  {t} =l copy {label}"));
        EmittedValue::new(t, VariableType::String, QbeType::L)
    }

    pub(crate) fn emit_variable_read(&mut self, name: &str, _line: u32) -> EmittedValue {
        if let Some(bound) = self.def_fn_bindings.get(name).cloned() {
            return bound;
        }
        let resolved = vars::resolve_variable(self.symbols, self.function.as_deref(), &mut self.globals, name);
        let qbe_type = resolved.var_type.storage_qbe_type();
        match resolved.location {
            VarLocation::DefFnParameter { mangled } | VarLocation::Parameter { mangled } => {
                EmittedValue::new(format!("%{}", sanitize(&mangled)), resolved.var_type, qbe_type)
            }
            VarLocation::Local { mangled } => {
                EmittedValue::new(format!("%local_{}", sanitize(&mangled)), resolved.var_type, qbe_type)
            }
            VarLocation::GlobalSlot { slot } => {
                let addr = self.new_temp();
                self.emit(&format!("  {addr} =l add $__global_vector, {}", slot * 8));
                let cache = self.new_temp();
                let op = if qbe_type == QbeType::D { "loadd" } else { "loadl" };
                self.emit(&format!("  {cache} ={qbe_type} {op} {addr}"));
                EmittedValue::new(cache, resolved.var_type, qbe_type)
            }
            VarLocation::FallbackMangled { mangled } => {
                EmittedValue::new(format!("%var_{}", sanitize(&mangled)), resolved.var_type, qbe_type)
            }
        }
    }

    /// Stores `value` (already promoted to the target type by the caller
    /// where that matters, e.g. LET) into the named variable.
    pub(crate) fn store_named(&mut self, name: &str, value: EmittedValue, _line: u32) {
        let resolved = vars::resolve_variable(self.symbols, self.function.as_deref(), &mut self.globals, name);
        let value = self.promote(value, resolved.var_type);
        match resolved.location {
            VarLocation::DefFnParameter { mangled } | VarLocation::Parameter { mangled } => {
                let qt = resolved.var_type.storage_qbe_type();
                self.emit(&format!("  %{} ={qt} copy {}", sanitize(&mangled), value.operand));
            }
            VarLocation::Local { mangled } => {
                let qt = resolved.var_type.storage_qbe_type();
                self.emit(&format!("  %local_{} ={qt} copy {}", sanitize(&mangled), value.operand));
            }
            VarLocation::GlobalSlot { slot } => {
                let addr = self.new_temp();
                self.emit(&format!("  {addr} =l add $__global_vector, {}", slot * 8));
                let op = if resolved.var_type.storage_qbe_type() == QbeType::D {
                    "stored"
                } else {
                    "storel"
                };
                self.emit(&format!("  {op} {}, {addr}", value.operand));
            }
            VarLocation::FallbackMangled { mangled } => {
                let qt = resolved.var_type.storage_qbe_type();
                self.emit(&format!("  %var_{} ={qt} copy {}", sanitize(&mangled), value.operand));
            }
        }
    }

    fn emit_array_read(&mut self, name: &str, indices: &[Expression], line: u32) -> EmittedValue {
        let arr_temp = format!("%arr_{}", sanitize(name));
        let index = self.emit_array_index(&arr_temp, indices, line);
        let elem_type = self
            .symbols
            .arrays
            .get(name)
            .map(|a| a.element_type)
            .unwrap_or(VariableType::Double);
        let (rt, ret_qbe) = match elem_type {
            VariableType::String => ("array_get_string", QbeType::L),
            VariableType::Single | VariableType::Double => ("array_get_double", QbeType::D),
            _ => ("array_get_int", QbeType::W),
        };
        let t = self.new_temp();
        self.emit(&format!(
            "  {t} ={ret_qbe} call ${rt}(l {arr_temp}, w {})",
            index.operand
        ));
        EmittedValue::new(t, elem_type, ret_qbe)
    }

    pub(crate) fn emit_array_store(&mut self, name: &str, indices: &[Expression], value: EmittedValue, line: u32) {
        let arr_temp = format!("%arr_{}", sanitize(name));
        let index = self.emit_array_index(&arr_temp, indices, line);
        let elem_type = self
            .symbols
            .arrays
            .get(name)
            .map(|a| a.element_type)
            .unwrap_or(VariableType::Double);
        let value = self.promote(value, elem_type);
        let rt = match elem_type {
            VariableType::String => "array_set_string",
            VariableType::Single | VariableType::Double => "array_set_double",
            _ => "array_set_int",
        };
        let qt = elem_type.storage_qbe_type();
        self.emit(&format!(
            "  call ${rt}(l {arr_temp}, w {}, {qt} {})",
            index.operand, value.operand
        ));
    }

    /// Evaluates every subscript and, for multi-dimensional arrays,
    /// linearizes them row-major using `array_lbound`/`array_ubound`
    /// (dimension extents can be dynamic, so they aren't known at compile
    /// time — spec.md §4.2.6 documents UDT field offsets as compile-time
    /// constants, but array dimension extents are a runtime property of
    /// `DIM`, so linearization has to call back into the runtime).
    fn emit_array_index(&mut self, arr_temp: &str, indices: &[Expression], line: u32) -> EmittedValue {
        let vals: Vec<EmittedValue> = indices.iter().map(|e| self.emit_expr(e, line)).collect();

        if self.options.bounds_checks {
            for (dim, val) in vals.iter().enumerate() {
                self.emit_bounds_check(arr_temp, dim, &val.operand);
            }
        }

        let mut acc = match vals.first() {
            Some(v) => v.operand.clone(),
            None => "0".to_string(),
        };
        for (dim, val) in vals.iter().enumerate().skip(1) {
            let ub = self.new_temp();
            self.emit(&format!("  {ub} =w call $array_ubound(l {arr_temp}, w {dim})"));
            let lb = self.new_temp();
            self.emit(&format!("  {lb} =w call $array_lbound(l {arr_temp}, w {dim})"));
            let span = self.new_temp();
            self.emit(&format!("  {span} =w sub {ub}, {lb}"));
            let extent = self.new_temp();
            self.emit(&format!("  {extent} =w add {span}, 1"));
            let scaled = self.new_temp();
            self.emit(&format!("  {scaled} =w mul {acc}, {extent}"));
            let next_acc = self.new_temp();
            self.emit(&format!("  {next_acc} =w add {scaled}, {}", val.operand));
            acc = next_acc;
        }
        EmittedValue::new(acc, VariableType::Integer, QbeType::W)
    }

    /// Emits `array_lbound`/`array_ubound` calls for dimension `dim` and a
    /// `basic_check_bounds` call against the subscript value, per the
    /// `CodeGenOptions::bounds_checks` option (spec.md §4.2 "Options govern
    /// ... bounds checks on arrays").
    fn emit_bounds_check(&mut self, arr_temp: &str, dim: usize, index_operand: &str) {
        let lb = self.new_temp();
        self.emit(&format!("  {lb} =w call $array_lbound(l {arr_temp}, w {dim})"));
        let ub = self.new_temp();
        self.emit(&format!("  {ub} =w call $array_ubound(l {arr_temp}, w {dim})"));
        self.emit(&format!(
            "  call $basic_check_bounds(w {index_operand}, w {lb}, w {ub})"
        ));
    }

    fn emit_member_access(&mut self, object: &Expression, member: &str, line: u32) -> EmittedValue {
        let mut path = vec![member.to_string()];
        let mut cursor = object;
        let root_name = loop {
            match cursor {
                Expression::Variable(name) => break name.clone(),
                Expression::MemberAccess { object, member } => {
                    path.push(member.clone());
                    cursor = object;
                }
                _ => {
                    self.diagnostics.push(CodeGenError::Unsupported {
                        line,
                        detail: "member access root is not a plain variable".to_string(),
                    });
                    break String::new();
                }
            }
        };
        path.reverse();

        let base = self.emit_variable_read(&root_name, line);
        // The symbol table doesn't carry a variable's record type name
        // directly (only `VariableType::UserDefined`), so the owning
        // record type is found by the first registered TYPE whose layout
        // actually has the requested field chain. Safe for programs where
        // field names aren't reused across unrelated records.
        let root_type = self
            .symbols
            .types
            .keys()
            .find(|name| {
                crate::codegen::udt::member_offset_chain(&self.udt_layouts, name, &path).is_some()
            })
            .cloned();

        let Some(root_type) = root_type else {
            self.diagnostics.push(CodeGenError::NameResolution {
                line,
                detail: format!("no TYPE has field chain {path:?}"),
            });
            return EmittedValue::new("0", VariableType::Integer, QbeType::W);
        };
        let (offset, field_type) =
            crate::codegen::udt::member_offset_chain(&self.udt_layouts, &root_type, &path)
                .expect("checked above");

        let addr = self.new_temp();
        self.emit(&format!("  {addr} =l add {}, {offset}", base.operand));
        let (var_type, load_op) = match field_type {
            crate::types::TypeDescriptor::Single => (VariableType::Single, "loads"),
            crate::types::TypeDescriptor::Double => (VariableType::Double, "loadd"),
            crate::types::TypeDescriptor::String | crate::types::TypeDescriptor::Pointer => {
                (VariableType::String, "loadl")
            }
            crate::types::TypeDescriptor::Byte => (VariableType::Integer, "loadub"),
            crate::types::TypeDescriptor::UByte => (VariableType::Integer, "loadub"),
            crate::types::TypeDescriptor::Short | crate::types::TypeDescriptor::UShort => {
                (VariableType::Integer, "loaduh")
            }
            _ => (VariableType::Long, "loadl"),
        };
        let t = self.new_temp();
        let qt = var_type.storage_qbe_type();
        self.emit(&format!("  {t} ={qt} {load_op} {addr}"));
        EmittedValue::new(t, var_type, qt)
    }

    fn emit_binary(&mut self, left: &Expression, op: BinOp, right: &Expression, line: u32) -> EmittedValue {
        let lv = self.emit_expr(left, line);
        let rv = self.emit_expr(right, line);

        if op == BinOp::Add && lv.var_type == VariableType::String && rv.var_type == VariableType::String {
            let t = self.new_temp();
            self.emit(&format!("  {t} =l call $str_concat(l {}, l {})", lv.operand, rv.operand));
            return EmittedValue::new(t, VariableType::String, QbeType::L);
        }

        if op.is_comparison() {
            if lv.var_type == VariableType::String && rv.var_type == VariableType::String {
                let cmp = self.new_temp();
                self.emit(&format!("  {cmp} =w call $str_compare(l {}, l {})", lv.operand, rv.operand));
                let t = self.new_temp();
                let opcode = comparison_opcode(op);
                self.emit(&format!("  {t} =w {opcode}w {cmp}, 0"));
                return EmittedValue::new(t, VariableType::Integer, QbeType::W);
            }
            let result_type = numeric_result_type(lv.var_type, rv.var_type);
            let l = self.promote(lv, result_type);
            let r = self.promote(rv, result_type);
            let qt = result_type.storage_qbe_type();
            let t = self.new_temp();
            let opcode = comparison_opcode(op);
            self.emit(&format!("  {t} =w {opcode}{qt} {}, {}", l.operand, r.operand));
            return EmittedValue::new(t, VariableType::Integer, QbeType::W);
        }

        if op.is_logical() {
            let l = self.promote(lv, VariableType::Long);
            let r = self.promote(rv, VariableType::Long);
            let qt = l.qbe_type.widen(r.qbe_type);
            let t = self.new_temp();
            match op {
                BinOp::And => self.emit(&format!("  {t} ={qt} and {}, {}", l.operand, r.operand)),
                BinOp::Or => self.emit(&format!("  {t} ={qt} or {}, {}", l.operand, r.operand)),
                BinOp::Xor => self.emit(&format!("  {t} ={qt} xor {}, {}", l.operand, r.operand)),
                BinOp::Eqv => {
                    let x = self.new_temp();
                    self.emit(&format!("  {x} ={qt} xor {}, {}", l.operand, r.operand));
                    self.emit(&format!("  {t} =w ceq{qt} {x}, 0"));
                }
                BinOp::Imp => {
                    let notl = self.new_temp();
                    self.emit(&format!("  {notl} =w ceq{qt} {}, 0", l.operand));
                    self.emit(&format!("  {t} ={qt} or {notl}, {}", r.operand));
                }
                _ => unreachable!("is_logical already matched"),
            }
            return EmittedValue::new(t, VariableType::Integer, qt);
        }

        if op == BinOp::Div {
            let l = self.promote(lv, VariableType::Double);
            let r = self.promote(rv, VariableType::Double);
            let t = self.new_temp();
            self.emit(&format!("  {t} =d div {}, {}", l.operand, r.operand));
            return EmittedValue::new(t, VariableType::Double, QbeType::D);
        }

        let result_type = numeric_result_type(lv.var_type, rv.var_type);
        let l = self.promote(lv, result_type);
        let r = self.promote(rv, result_type);
        let qt = result_type.storage_qbe_type();
        let mnemonic = match op {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::IntDiv => "div",
            BinOp::Mod => "rem",
            _ => unreachable!("comparisons/logicals/Div handled above"),
        };
        let t = self.new_temp();
        self.emit(&format!("  {t} ={qt} {mnemonic} {}, {}", l.operand, r.operand));
        EmittedValue::new(t, result_type, qt)
    }

    fn emit_unary(&mut self, op: UnOp, expr: &Expression, line: u32) -> EmittedValue {
        let v = self.emit_expr(expr, line);
        match op {
            UnOp::Plus => v,
            UnOp::Neg => {
                let t = self.new_temp();
                self.emit(&format!("  {t} ={} neg {}", v.qbe_type, v.operand));
                EmittedValue::new(t, v.var_type, v.qbe_type)
            }
            UnOp::Not => {
                let t = self.new_temp();
                self.emit(&format!("  {t} =w ceq{} {}, 0", v.qbe_type, v.operand));
                EmittedValue::new(t, VariableType::Integer, QbeType::W)
            }
        }
    }

    fn emit_call(&mut self, name: &str, arguments: &[Expression], line: u32) -> EmittedValue {
        let upper = name.to_ascii_uppercase();

        if let Some(def) = self.def_functions.get(&upper).cloned() {
            return self.emit_def_fn_call(&def, arguments, line);
        }

        if let Some(intrinsic) = intrinsics::lookup(&upper) {
            let args: Vec<EmittedValue> = arguments.iter().map(|a| self.emit_expr(a, line)).collect();
            self.stats.intrinsic_calls += 1;
            let promoted_type = args.first().map(|a| a.var_type).unwrap_or(VariableType::Double);
            let ret_qbe = intrinsic.returns.qbe_type(promoted_type);
            let arg_text: Vec<String> = args
                .iter()
                .map(|a| format!("{} {}", a.qbe_type, a.operand))
                .collect();
            let t = self.new_temp();
            self.emit(&format!(
                "  {t} ={ret_qbe} call ${}({})",
                intrinsic.runtime_fn,
                arg_text.join(", ")
            ));
            let ret_var_type = match intrinsic.returns {
                ReturnKind::Word => VariableType::Integer,
                ReturnKind::Long => VariableType::String,
                ReturnKind::LongNumeric => VariableType::Long,
                ReturnKind::Double => VariableType::Double,
                ReturnKind::Promoted => promoted_type,
            };
            return EmittedValue::new(t, ret_var_type, ret_qbe);
        }

        if let Some(func) = self.symbols.functions.get(&upper).cloned() {
            let args: Vec<EmittedValue> = arguments.iter().map(|a| self.emit_expr(a, line)).collect();
            let arg_text: Vec<String> = args
                .iter()
                .map(|a| format!("{} {}", a.qbe_type, a.operand))
                .collect();
            let ret_qbe = func.return_type.storage_qbe_type();
            let t = self.new_temp();
            self.emit(&format!(
                "  {t} ={ret_qbe} call ${}({})",
                sanitize(&func.mangled_name),
                arg_text.join(", ")
            ));
            return EmittedValue::new(t, func.return_type, ret_qbe);
        }

        self.diagnostics.push(CodeGenError::NameResolution {
            line,
            detail: format!("unknown function or intrinsic `{name}`"),
        });
        EmittedValue::new("0", VariableType::Integer, QbeType::W)
    }

    /// DEF FN has no callable QBE function (spec.md §4.1 Phase 1 DEF note);
    /// its body expression is inlined at the call site with parameters
    /// bound to the argument values via temporary locals.
    fn emit_def_fn_call(
        &mut self,
        def: &crate::cfg::DefFnInfo<'a>,
        arguments: &[Expression],
        line: u32,
    ) -> EmittedValue {
        let saved_bindings = self.def_fn_bindings.clone();
        for (param, arg) in def.parameters.iter().zip(arguments) {
            let val = self.emit_expr(arg, line);
            let val = self.promote(val, param.param_type);
            self.def_fn_bindings.insert(param.name.clone(), val);
        }
        let result = self.emit_expr(def.body, line);
        self.def_fn_bindings = saved_bindings;
        result
    }

    fn emit_iif(&mut self, cond: &Expression, true_val: &Expression, false_val: &Expression, line: u32) -> EmittedValue {
        let c = self.emit_expr(cond, line);
        let label_true = self.new_synthetic_label("iif_true");
        let label_false = self.new_synthetic_label("iif_false");
        let label_end = self.new_synthetic_label("iif_end");
        self.emit(&format!("  jnz {}, {label_true}, {label_false}", c.operand));

        self.emit(&format!("{label_true}"));
        let tv = self.emit_expr(true_val, line);
        let result_type = numeric_result_type_lenient(tv.var_type, true_val, false_val);
        let tv = self.promote(tv, result_type);
        self.emit(&format!("  jmp {label_end}"));

        self.emit(&format!("{label_false}"));
        let fv = self.emit_expr(false_val, line);
        let fv = self.promote(fv, result_type);
        self.emit(&format!("  jmp {label_end}"));

        self.emit(&format!("{label_end}"));
        let qt = result_type.storage_qbe_type();
        let result = self.new_temp();
        self.emit(&format!(
            "  {result} ={qt} phi {label_true} {}, {label_false} {}",
            tv.operand, fv.operand
        ));
        EmittedValue::new(result, result_type, qt)
    }

    /// Applies spec.md §4.2.2's `promote(value, fromType, toType,
    /// actualFromQBE)` rules.
    pub(crate) fn promote(&mut self, value: EmittedValue, to: VariableType) -> EmittedValue {
        if value.var_type == to || value.qbe_type == to.storage_qbe_type() {
            return EmittedValue::new(value.operand, to, to.storage_qbe_type());
        }
        let to_qbe = to.storage_qbe_type();
        match (value.qbe_type, to_qbe) {
            (QbeType::W, QbeType::D) => {
                let long = self.new_temp();
                self.emit(&format!("  {long} =l extsw {}", value.operand));
                let d = self.new_temp();
                self.emit(&format!("  {d} =d sltof {long}"));
                EmittedValue::new(d, to, QbeType::D)
            }
            (QbeType::L, QbeType::D) => {
                let d = self.new_temp();
                self.emit(&format!("  {d} =d sltof {}", value.operand));
                EmittedValue::new(d, to, QbeType::D)
            }
            (QbeType::W, QbeType::S) => {
                let long = self.new_temp();
                self.emit(&format!("  {long} =l extsw {}", value.operand));
                let s = self.new_temp();
                self.emit(&format!("  {s} =s sltof {long}"));
                EmittedValue::new(s, to, QbeType::S)
            }
            (QbeType::L, QbeType::S) => {
                let s = self.new_temp();
                self.emit(&format!("  {s} =s sltof {}", value.operand));
                EmittedValue::new(s, to, QbeType::S)
            }
            (QbeType::D, QbeType::S) => {
                let s = self.new_temp();
                self.emit(&format!("  {s} =s truncd {}", value.operand));
                EmittedValue::new(s, to, QbeType::S)
            }
            (QbeType::S, QbeType::D) => {
                let d = self.new_temp();
                self.emit(&format!("  {d} =d exts {}", value.operand));
                EmittedValue::new(d, to, QbeType::D)
            }
            (QbeType::D, QbeType::L) | (QbeType::D, QbeType::W) => {
                let l = self.new_temp();
                self.emit(&format!("  {l} =l dtosi {}", value.operand));
                EmittedValue::new(l, to, to_qbe)
            }
            (QbeType::S, QbeType::L) | (QbeType::S, QbeType::W) => {
                let l = self.new_temp();
                self.emit(&format!("  {l} =l stosi {}", value.operand));
                EmittedValue::new(l, to, to_qbe)
            }
            _ => EmittedValue::new(value.operand, to, to_qbe),
        }
    }
}

fn comparison_opcode(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "ceq",
        BinOp::Ne => "cne",
        BinOp::Lt => "cslt",
        BinOp::Le => "csle",
        BinOp::Gt => "csgt",
        BinOp::Ge => "csge",
        _ => unreachable!("only comparison ops reach here"),
    }
}

/// "DOUBLE dominates; FLOAT maps to DOUBLE; INT+INT stays INT; default
/// DOUBLE" (spec.md §4.2.2).
fn numeric_result_type(a: VariableType, b: VariableType) -> VariableType {
    use VariableType::*;
    match (a, b) {
        (Double, _) | (_, Double) => Double,
        (Single, _) | (_, Single) => Double,
        (Integer, Integer) | (Long, Long) | (Integer, Long) | (Long, Integer) => Long,
        _ => Double,
    }
}

fn numeric_result_type_lenient(fallback: VariableType, _a: &Expression, _b: &Expression) -> VariableType {
    fallback
}

pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
