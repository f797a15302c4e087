//! Statement emission (spec.md §4.2.3).
//!
//! Branching statements (IF, FOR-check, WHILE header, DO/LOOP, UNTIL,
//! SELECT CASE tests, ON GOTO/ON GOSUB) only need to evaluate their
//! condition or selector here and record it; the branch itself is wired by
//! the CFG's edges and emitted generically by `codegen::blocks`'s
//! block-terminator cascade. This also means spec.md §4.2.3's separate
//! "single-line inline IF" codegen path collapses into the ordinary
//! multi-line IF path in this implementation: the CFG builder (§4.1.1)
//! already gives both IF shapes identical block structure, so there is
//! nothing left for statement emission to special-case.

use crate::ast::{CaseValue, DoConditionType, ExitKind, LValue, PrintSeparator, Statement};
use crate::cfg::ControlFlowGraph;
use crate::codegen::expr::EmittedValue;
use crate::codegen::vars::{self, VarLocation};
use crate::types::{QbeType, VariableType};

use super::CodeGenerator;

impl<'a> CodeGenerator<'a> {
    /// Emits one statement. Returns `true` if the statement already wrote
    /// its own unconditional control transfer, so `blocks::emit_block`
    /// should not also append a generic terminator.
    pub(crate) fn emit_statement(
        &mut self,
        stmt: &Statement,
        line: u32,
        block_id: u32,
        cfg: &ControlFlowGraph,
    ) -> bool {
        if self.options.emit_comments {
            self.emit_comment(&format!("line {line}"));
        }
        match stmt {
            Statement::Print { items, suppress_newline } => {
                self.emit_print(items, line);
                if !*suppress_newline {
                    self.emit("  call $basic_print_newline()");
                }
                false
            }
            Statement::Input { prompt, targets } => {
                if let Some(text) = prompt {
                    let v = self.emit_expr(&crate::ast::Expression::StringLiteral(text.clone()), line);
                    self.emit(&format!("  call $basic_print_string(l {})", v.operand));
                }
                for target in targets {
                    self.emit_input_target(target, line);
                }
                false
            }
            Statement::Let { target, value } => {
                let v = self.emit_expr(value, line);
                self.store_lvalue(target, v, line);
                false
            }
            Statement::If { condition, .. } => {
                let v = self.emit_expr(condition, line);
                self.last_condition = Some(v.operand);
                false
            }
            Statement::For { variable, start, end, step } => {
                self.emit_for_init(variable, start, end, step.as_ref(), block_id, cfg, line);
                false
            }
            Statement::Next { .. } => {
                self.emit_next(block_id, cfg, line);
                false
            }
            Statement::While { condition } => {
                let v = self.emit_expr(condition, line);
                self.last_condition = Some(v.operand);
                false
            }
            Statement::Wend => false,
            Statement::Do { condition_type, condition } => {
                if *condition_type != DoConditionType::None {
                    if let Some(cond) = condition {
                        let v = self.emit_expr(cond, line);
                        self.last_condition = Some(self.condition_for(*condition_type, v));
                    }
                }
                false
            }
            Statement::Loop { condition_type, condition } => {
                if *condition_type != DoConditionType::None {
                    if let Some(cond) = condition {
                        let v = self.emit_expr(cond, line);
                        self.last_condition = Some(self.condition_for(*condition_type, v));
                    }
                }
                false
            }
            Statement::Repeat => false,
            Statement::Until { condition } => {
                let v = self.emit_expr(condition, line);
                self.last_condition = Some(v.operand);
                false
            }
            Statement::Case { selector, when_clauses, .. } => {
                let v = self.emit_expr(selector, line);
                self.register_case_tests(block_id, cfg, &v, when_clauses);
                self.last_selector = Some((v.operand, v.var_type));
                false
            }
            Statement::TryCatch { .. } => false,
            Statement::Throw(expr) => {
                if let Some(e) = expr {
                    self.emit_expr(e, line);
                }
                // Exception delivery is a runtime concern (spec.md §4.1
                // Phase 1 THROW note); the compiler cannot simulate the
                // dispatch-block condition without a runtime hook the ABI
                // (spec.md §6) doesn't expose, so control falls through to
                // whatever edge the CFG wired for this block.
                false
            }
            Statement::Goto(_) => false,
            Statement::Gosub(_) => false,
            Statement::OnGoto { selector, .. } | Statement::OnGosub { selector, .. } => {
                let v = self.emit_expr(selector, line);
                self.last_selector = Some((v.operand, VariableType::Integer));
                false
            }
            Statement::OnEvent { .. } => false,
            Statement::Label(_) => false,
            Statement::Dim(decls) => {
                for decl in decls {
                    self.emit_dim(decl, line);
                }
                false
            }
            Statement::Return(expr) => {
                if let Some(e) = expr {
                    let v = self.emit_expr(e, line);
                    if let Some(fname) = self.function.clone() {
                        let return_type = self
                            .symbols
                            .functions
                            .get(&fname)
                            .map(|f| f.return_type)
                            .unwrap_or(VariableType::Double);
                        let v = self.promote(v, return_type);
                        let qt = return_type.storage_qbe_type();
                        self.emit(&format!("  %var_{} ={qt} copy {}", super::expr::sanitize(&fname), v.operand));
                    }
                }
                self.emit(&format!("  jmp @block_{}", cfg.exit_block));
                true
            }
            Statement::End => {
                self.emit(&format!("  jmp @block_{}", cfg.exit_block));
                true
            }
            Statement::Exit(kind) => {
                match kind {
                    ExitKind::Function | ExitKind::Sub => {
                        self.emit(&format!("  jmp @block_{}", cfg.exit_block));
                    }
                    ExitKind::ForLoop | ExitKind::Do | ExitKind::While => {
                        // The target is whichever exit block the CFG wired
                        // for this pending-exit site; that's the block's
                        // (already-resolved) sole successor.
                        if let Some(&target) = cfg.block(block_id).successors.first() {
                            self.emit(&format!("  jmp @block_{target}"));
                        }
                    }
                }
                true
            }
            Statement::Function { .. } | Statement::Sub { .. } | Statement::Def { .. } => {
                // Never placed into a CFG's statement list (spec.md §4.1
                // Phase 1: these push/pop a separate CFG context instead).
                false
            }
            Statement::Local(_) | Statement::Shared(_) => false,
            Statement::Rem(_) => false,
            Statement::Call { name, arguments } => {
                self.emit_call(name, arguments, line);
                false
            }
        }
    }

    fn emit_print(&mut self, items: &[crate::ast::PrintItem], line: u32) {
        for item in items {
            let v = self.emit_expr(&item.expr, line);
            match v.var_type {
                VariableType::String => {
                    self.emit(&format!("  call $basic_print_string(l {})", v.operand));
                }
                VariableType::Single | VariableType::Double => {
                    let v = self.promote(v, VariableType::Double);
                    self.emit(&format!("  call $basic_print_double(d {})", v.operand));
                }
                _ => {
                    let v = self.promote(v, VariableType::Integer);
                    self.emit(&format!("  call $basic_print_int({} {})", QbeType::W, v.operand));
                }
            }
            match item.separator {
                PrintSeparator::Comma => self.emit("  call $basic_print_tab()"),
                PrintSeparator::Semicolon | PrintSeparator::None => {}
            }
        }
    }

    fn emit_input_target(&mut self, target: &LValue, line: u32) {
        let var_type = self.lvalue_type(target);
        let (rt, qt) = match var_type {
            VariableType::String => ("basic_input_line", QbeType::L),
            VariableType::Single | VariableType::Double => ("basic_input_double", QbeType::D),
            _ => ("basic_input_int", QbeType::W),
        };
        let t = self.new_temp();
        self.emit(&format!("  {t} ={qt} call ${rt}()"));
        self.store_lvalue(target, EmittedValue::new(t, var_type, qt), line);
    }

    fn lvalue_type(&mut self, lvalue: &LValue) -> VariableType {
        match lvalue {
            LValue::Variable(name) => {
                vars::resolve_variable(self.symbols, self.function.as_deref(), &mut self.globals, name).var_type
            }
            LValue::ArrayElement { name, .. } => self
                .symbols
                .arrays
                .get(name)
                .map(|a| a.element_type)
                .unwrap_or(VariableType::Double),
            LValue::Member { .. } => VariableType::Double,
        }
    }

    pub(crate) fn store_lvalue(&mut self, lvalue: &LValue, value: EmittedValue, line: u32) {
        match lvalue {
            LValue::Variable(name) => self.store_named(name, value, line),
            LValue::ArrayElement { name, indices } => self.emit_array_store(name, indices, value, line),
            LValue::Member { object, member } => self.store_member(object, member, value, line),
        }
    }

    fn store_member(&mut self, object: &LValue, member: &str, value: EmittedValue, line: u32) {
        let mut path = vec![member.to_string()];
        let mut cursor = object;
        let root_name = loop {
            match cursor {
                LValue::Variable(name) => break name.clone(),
                LValue::Member { object, member } => {
                    path.push(member.clone());
                    cursor = object;
                }
                LValue::ArrayElement { name, .. } => break name.clone(),
            }
        };
        path.reverse();

        let base = self.emit_variable_read(&root_name, line);
        let root_type = self.symbols.types.keys().find(|name| {
            crate::codegen::udt::member_offset_chain(&self.udt_layouts, name, &path).is_some()
        });
        let Some(root_type) = root_type.cloned() else {
            self.diagnostics.push(super::CodeGenError::NameResolution {
                line,
                detail: format!("no TYPE has field chain {path:?}"),
            });
            return;
        };
        let (offset, field_type) =
            crate::codegen::udt::member_offset_chain(&self.udt_layouts, &root_type, &path)
                .expect("checked above");
        let field_var_type = match field_type {
            crate::types::TypeDescriptor::Single => VariableType::Single,
            crate::types::TypeDescriptor::Double => VariableType::Double,
            crate::types::TypeDescriptor::String | crate::types::TypeDescriptor::Pointer => VariableType::String,
            _ => VariableType::Long,
        };
        let value = self.promote(value, field_var_type);
        let addr = self.new_temp();
        self.emit(&format!("  {addr} =l add {}, {offset}", base.operand));
        let store_op = match field_type {
            crate::types::TypeDescriptor::Single => "stores",
            crate::types::TypeDescriptor::Double => "stored",
            crate::types::TypeDescriptor::Byte | crate::types::TypeDescriptor::UByte => "storeb",
            crate::types::TypeDescriptor::Short | crate::types::TypeDescriptor::UShort => "storeh",
            _ => "storel",
        };
        self.emit(&format!("  {store_op} {}, {addr}", value.operand));
    }

    fn emit_dim(&mut self, decl: &crate::ast::ArrayDecl, line: u32) {
        let dims: Vec<EmittedValue> = decl.dimensions.iter().map(|e| self.emit_expr(e, line)).collect();
        let mut args = vec![format!("w {}", dims.len())];
        for d in &dims {
            args.push(format!("w {}", d.operand));
        }
        let t = format!("%arr_{}", super::expr::sanitize(&decl.name));
        self.emit(&format!("  {t} =l call $array_create({})", args.join(", ")));
    }

    fn emit_for_init(
        &mut self,
        variable: &str,
        start: &crate::ast::Expression,
        end: &crate::ast::Expression,
        step: Option<&crate::ast::Expression>,
        block_id: u32,
        cfg: &ControlFlowGraph,
        line: u32,
    ) {
        let start_val = self.emit_expr(start, line);
        let var_type = start_val.var_type;
        self.store_named(variable, start_val, line);

        let end_val = self.emit_expr(end, line);
        let step_val = step.map(|s| self.emit_expr(s, line));

        let info = cfg.for_loops.iter().find(|f| f.init_block == block_id);
        match info {
            Some(info) => {
                self.for_loop_state.insert(
                    info.check_block,
                    super::ForLoopGenState {
                        variable: variable.to_string(),
                        var_type,
                        end_operand: end_val.operand,
                        step_operand: step_val.map(|v| v.operand),
                    },
                );
            }
            None => {
                self.diagnostics.push(super::CodeGenError::Internal(format!(
                    "FOR at line {line} has no matching loop info for block {block_id}"
                )));
            }
        }
    }

    fn emit_next(&mut self, block_id: u32, cfg: &ControlFlowGraph, line: u32) {
        let Some(info) = cfg.for_loops.iter().find(|f| f.next_block == block_id) else {
            return;
        };
        let Some(state) = self.for_loop_state.get(&info.check_block).cloned() else {
            return;
        };
        let cur = self.emit_variable_read(&state.variable, line);
        let step_operand = state.step_operand.clone().unwrap_or_else(|| "1".to_string());
        let qt = state.var_type.storage_qbe_type();
        let t = self.new_temp();
        self.emit(&format!("  {t} ={qt} add {}, {}", cur.operand, step_operand));
        self.store_named(&state.variable, EmittedValue::new(t, state.var_type, qt), line);
    }

    /// Synthesizes the FOR loop's comparison in its check block, which has
    /// no AST statement of its own (spec.md §4.1.2: the FOR statement
    /// lives in the init block, NEXT in its own block). Called from
    /// `codegen::blocks` before the generic block-terminator cascade.
    pub(crate) fn emit_for_check(&mut self, block_id: u32) {
        let Some(state) = self.for_loop_state.get(&block_id).cloned() else {
            return;
        };
        let cur = self.emit_variable_read(&state.variable, 0);
        let qt = state.var_type.storage_qbe_type();

        // STEP's sign picks ascending vs. descending comparison. A literal
        // STEP resolves this at compile time; a non-literal STEP defaults
        // to ascending rather than emitting both a runtime sign test and
        // both comparison branches (spec.md §4.1.2 licenses either).
        let descending = state
            .step_operand
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|v| v < 0.0)
            .unwrap_or(false);
        let opcode = if descending { "csge" } else { "csle" };

        let t = self.new_temp();
        self.emit(&format!("  {t} =w {opcode}{qt} {}, {}", cur.operand, state.end_operand));
        self.last_condition = Some(t);
    }

    fn condition_for(&mut self, condition_type: DoConditionType, value: EmittedValue) -> String {
        match condition_type {
            DoConditionType::While => value.operand,
            DoConditionType::Until => {
                let t = self.new_temp();
                self.emit(&format!("  {t} =w ceq{} {}, 0", value.qbe_type, value.operand));
                t
            }
            DoConditionType::None => value.operand,
        }
    }

    fn register_case_tests(
        &mut self,
        select_block: u32,
        cfg: &ControlFlowGraph,
        selector: &EmittedValue,
        when_clauses: &[crate::ast::CaseWhenClause],
    ) {
        let Some(info) = cfg.select_cases.iter().find(|c| c.select_block == select_block) else {
            return;
        };
        for (i, test_block) in info.test_blocks.iter().enumerate() {
            if let Some(clause) = when_clauses.get(i) {
                self.case_tests.insert(
                    *test_block,
                    (selector.operand.clone(), selector.var_type, clause.values.clone()),
                );
            }
        }
    }

    /// Emits the equality/range/IS comparison for one SELECT CASE test
    /// block, called from `codegen::blocks` before the generic terminator
    /// (the original `Case` statement lives only in the select block; test
    /// blocks have no statements of their own).
    pub(crate) fn emit_case_test(&mut self, block_id: u32, line: u32) {
        let Some((selector_operand, selector_type, values)) = self.case_tests.get(&block_id).cloned() else {
            return;
        };
        let qt = selector_type.storage_qbe_type();
        let mut any_temp: Option<String> = None;
        for value in &values {
            let t = match value {
                CaseValue::Value(expr) => {
                    let v = self.emit_expr(expr, line);
                    let v = self.promote(v, selector_type);
                    let t = self.new_temp();
                    self.emit(&format!("  {t} =w ceq{qt} {selector_operand}, {}", v.operand));
                    t
                }
                CaseValue::Range(lo, hi) => {
                    let lo = self.emit_expr(lo, line);
                    let hi = self.emit_expr(hi, line);
                    let lo = self.promote(lo, selector_type);
                    let hi = self.promote(hi, selector_type);
                    let ge = self.new_temp();
                    self.emit(&format!("  {ge} =w csge{qt} {selector_operand}, {}", lo.operand));
                    let le = self.new_temp();
                    self.emit(&format!("  {le} =w csle{qt} {selector_operand}, {}", hi.operand));
                    let t = self.new_temp();
                    self.emit(&format!("  {t} =w and {ge}, {le}"));
                    t
                }
                CaseValue::Is(op, expr) => {
                    let v = self.emit_expr(expr, line);
                    let v = self.promote(v, selector_type);
                    let opcode = match op {
                        crate::ast::BinOp::Eq => "ceq",
                        crate::ast::BinOp::Ne => "cne",
                        crate::ast::BinOp::Lt => "cslt",
                        crate::ast::BinOp::Le => "csle",
                        crate::ast::BinOp::Gt => "csgt",
                        crate::ast::BinOp::Ge => "csge",
                        _ => "ceq",
                    };
                    let t = self.new_temp();
                    self.emit(&format!("  {t} =w {opcode}{qt} {selector_operand}, {}", v.operand));
                    t
                }
            };
            any_temp = Some(match any_temp {
                None => t,
                Some(prev) => {
                    let combined = self.new_temp();
                    self.emit(&format!("  {combined} =w or {prev}, {t}"));
                    combined
                }
            });
        }
        self.last_condition = any_temp;
    }
}
