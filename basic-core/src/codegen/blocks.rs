//! Function and block emission (spec.md §4.2.1, §4.2.5).

use crate::cfg::{BasicBlock, CFGEdge, ControlFlowGraph};
use crate::types::VariableType;

use super::expr::sanitize;
use super::CodeGenerator;

impl<'a> CodeGenerator<'a> {
    /// Emits one function's (or the main program's) QBE text: signature,
    /// entry lifecycle hooks, every block in id order, and the exit
    /// epilogue (spec.md §4.2.5).
    pub(crate) fn emit_function_body(
        &mut self,
        qbe_name: &str,
        cfg: &ControlFlowGraph,
        return_type: VariableType,
        parameters: &[(String, VariableType)],
        is_sub: bool,
        is_main: bool,
    ) {
        let params_text: Vec<String> = parameters
            .iter()
            .map(|(name, t)| format!("{} %{}", t.storage_qbe_type(), sanitize(name)))
            .collect();

        if is_main {
            self.emit(&format!("export function w ${qbe_name}() {{"));
        } else if is_sub {
            self.emit(&format!("function ${qbe_name}({}) {{", params_text.join(", ")));
        } else {
            self.emit(&format!(
                "function {} ${qbe_name}({}) {{",
                return_type.storage_qbe_type(),
                params_text.join(", ")
            ));
        }

        self.emit(&format!("@block_{}", cfg.entry_block));
        if is_main {
            self.emit("  call $basic_init()");
        }
        if !is_main && !is_sub {
            let qt = return_type.storage_qbe_type();
            self.emit(&format!("  %var_{qbe_name} ={qt} copy {}", zero_literal(return_type)));
        }

        for block in &cfg.blocks {
            if block.id != cfg.entry_block {
                self.emit(&format!("@block_{}", block.id));
            }

            // Phase 5's optional merge orphans dead blocks by clearing
            // their edges once every predecessor is rewired past them;
            // nothing reaches one, so there's nothing to emit beyond the
            // label above (kept only so a stray reference wouldn't dangle).
            if block.is_empty()
                && block.successors.is_empty()
                && block.predecessors.is_empty()
                && block.id != cfg.entry_block
                && block.id != cfg.exit_block
            {
                continue;
            }

            self.emit_case_test(block.id, 0);
            self.emit_for_check(block.id);

            let mut terminated = false;
            for entry in &block.statements {
                terminated = self.emit_statement(entry.statement, entry.line, block.id, cfg);
            }

            if block.id == cfg.exit_block {
                if is_main {
                    self.emit("  call $basic_cleanup()");
                    self.emit("  ret 0");
                } else if is_sub {
                    self.emit("  ret");
                } else {
                    self.emit(&format!("  ret %var_{qbe_name}"));
                }
            } else if !terminated {
                self.emit_terminator(block, cfg);
            }

            self.stats.blocks_emitted += 1;
        }

        self.emit("}");
    }

    /// Per spec.md §4.2.1: 0 successors jumps to exit, 1 is a plain jump,
    /// 2 is a `jnz` on the last recorded condition, 3+ (ON GOTO/SELECT
    /// dispatch) is an equality-test cascade against the last selector.
    fn emit_terminator(&mut self, block: &BasicBlock, cfg: &ControlFlowGraph) {
        match block.successors.len() {
            0 => {
                self.emit(&format!("  jmp @block_{}", cfg.exit_block));
            }
            1 => {
                self.emit(&format!("  jmp @block_{}", block.successors[0]));
            }
            2 => self.emit_conditional_terminator(block, cfg),
            _ => self.emit_dispatch_terminator(block, cfg),
        }
    }

    fn emit_conditional_terminator(&mut self, block: &BasicBlock, cfg: &ControlFlowGraph) {
        let edges: Vec<&CFGEdge> = cfg.edges.iter().filter(|e| e.from == block.id).collect();
        let truthy = |label: &str| matches!(label, "true" | "continue" | "normal");
        let true_edge = edges.iter().find(|e| e.label.as_deref().map(truthy).unwrap_or(false));

        let (true_to, false_to) = match true_edge {
            Some(e) => {
                let other = edges.iter().find(|o| o.to != e.to).map(|o| o.to).unwrap_or(block.successors[1]);
                (e.to, other)
            }
            None => (block.successors[0], block.successors[1]),
        };

        let cond = self.last_condition.clone().unwrap_or_else(|| "0".to_string());
        self.emit(&format!("  jnz {cond}, @block_{true_to}, @block_{false_to}"));
    }

    fn emit_dispatch_terminator(&mut self, block: &BasicBlock, cfg: &ControlFlowGraph) {
        let edges: Vec<CFGEdge> = cfg.edges.iter().filter(|e| e.from == block.id).cloned().collect();
        let selector = self
            .last_selector
            .clone()
            .map(|(op, _)| op)
            .unwrap_or_else(|| "0".to_string());

        let mut default_target = cfg.exit_block;
        let mut numbered: Vec<(u32, u32)> = Vec::new();
        for e in &edges {
            match e.label.as_deref().and_then(|l| l.parse::<u32>().ok()) {
                Some(idx) => numbered.push((idx, e.to)),
                None => default_target = e.to,
            }
        }
        numbered.sort_by_key(|(idx, _)| *idx);

        for (idx, target) in numbered {
            let t = self.new_temp();
            self.emit(&format!("  {t} =w ceqw {selector}, {idx}"));
            let next = self.new_synthetic_label("dispatch");
            self.emit(&format!("  jnz {t}, @block_{target}, {next}"));
            self.emit(&format!("{next}"));
        }
        self.emit(&format!("  jmp @block_{default_target}"));
    }
}

fn zero_literal(var_type: VariableType) -> &'static str {
    match var_type {
        VariableType::Double => "d_0",
        VariableType::Single => "s_0",
        _ => "0",
    }
}
