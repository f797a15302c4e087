//! Phase 3: loop identification (spec.md §4.1 Phase 3).
//!
//! Structured loops (FOR/WHILE/DO/REPEAT) already have their header blocks
//! flagged by the builder as they're constructed. This pass exists for the
//! unstructured case: a plain `GOTO` aimed at an earlier line forms a loop
//! the builder never saw as a loop, since it's just another Unconditional
//! edge to it. A back-edge — one whose target is an ancestor of the current
//! block in some DFS tree rooted at the entry — always indicates a cycle,
//! and the target is this cycle's header.

use crate::cfg::ControlFlowGraph;
use std::collections::HashSet;

pub fn identify_loops(g: &mut ControlFlowGraph) {
    if g.blocks.is_empty() {
        return;
    }
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    let mut headers = HashSet::new();
    let mut stack = vec![(g.entry_block, 0usize)];
    visited.insert(g.entry_block);
    on_stack.insert(g.entry_block);

    // Iterative DFS (BASIC programs can be deep enough to make recursion
    // risky once every line potentially nests a construct).
    while let Some(&mut (node, ref mut next_idx)) = stack.last_mut() {
        let successors = g.block(node).successors.clone();
        if *next_idx < successors.len() {
            let succ = successors[*next_idx];
            *next_idx += 1;
            if on_stack.contains(&succ) {
                headers.insert(succ);
            } else if !visited.contains(&succ) {
                visited.insert(succ);
                on_stack.insert(succ);
                stack.push((succ, 0));
            }
        } else {
            on_stack.remove(&node);
            stack.pop();
        }
    }

    for header in headers {
        g.block_mut(header).is_loop_header = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::EdgeKind;

    #[test]
    fn detects_unstructured_goto_loop() {
        let mut g = ControlFlowGraph::new();
        for _ in 0..3 {
            let id = g.blocks.len() as u32;
            g.blocks.push(crate::cfg::BasicBlock::new(id));
        }
        g.entry_block = 0;
        g.exit_block = 2;
        g.add_edge(0, 1, EdgeKind::Fallthrough, None);
        g.add_edge(1, 0, EdgeKind::Unconditional, None); // GOTO back to line 1
        g.add_edge(1, 2, EdgeKind::Conditional, Some("false"));

        identify_loops(&mut g);
        assert!(g.block(0).is_loop_header);
    }
}
