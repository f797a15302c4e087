//! Human-readable CFG dump, for `--emit cfg-text` and for debugging test
//! failures (spec.md §6 CLI surface).

use crate::cfg::{ControlFlowGraph, EdgeKind};
use std::fmt::Write as _;

fn edge_kind_str(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Fallthrough => "fallthrough",
        EdgeKind::Conditional => "conditional",
        EdgeKind::Unconditional => "unconditional",
        EdgeKind::Call => "call",
        EdgeKind::Return => "return",
    }
}

/// Renders one CFG as a block-by-block text listing: each block's id, any
/// flags (`loop-header`, `subroutine`, `terminator`), its statement count,
/// and its outgoing edges.
pub fn report(g: &ControlFlowGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "entry: B{}  exit: B{}", g.entry_block, g.exit_block);
    for block in &g.blocks {
        let mut flags = Vec::new();
        if block.id == g.entry_block {
            flags.push("entry");
        }
        if block.id == g.exit_block {
            flags.push("exit");
        }
        if block.is_loop_header {
            flags.push("loop-header");
        }
        if block.is_subroutine {
            flags.push("subroutine");
        }
        if block.is_terminator {
            flags.push("terminator");
        }
        let flag_str = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        let label_str = block
            .label
            .as_ref()
            .map(|l| format!(" ({l})"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "B{}{}{}: {} statement(s)",
            block.id,
            label_str,
            flag_str,
            block.statements.len()
        );
        for edge in g.edges.iter().filter(|e| e.from == block.id) {
            let label = edge
                .label
                .as_ref()
                .map(|l| format!(" \"{l}\""))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    -> B{} [{}{}]",
                edge.to,
                edge_kind_str(edge.kind),
                label
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::EdgeKind;

    #[test]
    fn renders_entry_exit_and_one_edge() {
        let mut g = ControlFlowGraph::new();
        g.blocks.push(crate::cfg::BasicBlock::new(0));
        g.blocks.push(crate::cfg::BasicBlock::new(1));
        g.entry_block = 0;
        g.exit_block = 1;
        g.add_edge(0, 1, EdgeKind::Fallthrough, None);

        let text = report(&g);
        assert!(text.contains("entry: B0"));
        assert!(text.contains("-> B1 [fallthrough]"));
    }
}
