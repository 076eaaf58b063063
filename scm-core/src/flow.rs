//! Control-flow index: every jump edge, queryable by either endpoint.

use std::collections::{BTreeMap, BTreeSet};

use crate::decoder::Instruction;
use crate::opcode::jump_kind;

/// A directed edge from a jump instruction to its destination offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JumpEdge {
    pub source: i32,
    pub dest: i32,
    pub opcode: u16,
}

/// Bidirectional index over the jump edges of a script.
#[derive(Debug, Default, Clone)]
pub struct FlowIndex {
    by_source: BTreeMap<i32, BTreeSet<JumpEdge>>,
    by_dest: BTreeMap<i32, BTreeSet<JumpEdge>>,
}

impl FlowIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: JumpEdge) {
        self.by_source.entry(edge.source).or_default().insert(edge);
        self.by_dest.entry(edge.dest).or_default().insert(edge);
    }

    pub fn edges_from(&self, source: i32) -> impl Iterator<Item = &JumpEdge> {
        self.by_source.get(&source).into_iter().flatten()
    }

    pub fn edges_to(&self, dest: i32) -> impl Iterator<Item = &JumpEdge> {
        self.by_dest.get(&dest).into_iter().flatten()
    }

    pub fn is_jump_source(&self, offset: i32) -> bool {
        self.by_source.contains_key(&offset)
    }

    pub fn is_jump_destination(&self, offset: i32) -> bool {
        self.by_dest.contains_key(&offset)
    }

    pub fn edge_count(&self) -> usize {
        self.by_source.values().map(BTreeSet::len).sum()
    }

    /// Drop every edge and re-derive the index from the instruction
    /// list. Passes that rewrite jumps call this afterwards so both
    /// maps stay in agreement.
    pub fn rebuild(&mut self, instructions: &[Instruction]) {
        self.by_source.clear();
        self.by_dest.clear();

        for inst in instructions {
            if jump_kind(inst.opcode).is_none() || inst.operands.is_empty() {
                continue;
            }
            if let Some(dest) = inst.jump_dest() {
                self.add_edge(JumpEdge {
                    source: inst.offset,
                    dest,
                    opcode: inst.opcode,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::{OPCODE_JUMP, OPCODE_JUMP_IF_FALSE};
    use pretty_assertions::assert_eq;

    #[test]
    fn indexes_both_endpoints() {
        let mut flow = FlowIndex::new();
        flow.add_edge(JumpEdge {
            source: 10,
            dest: 40,
            opcode: OPCODE_JUMP,
        });
        flow.add_edge(JumpEdge {
            source: 22,
            dest: 40,
            opcode: OPCODE_JUMP_IF_FALSE,
        });

        assert!(flow.is_jump_source(10));
        assert!(flow.is_jump_destination(40));
        assert!(!flow.is_jump_destination(10));
        assert_eq!(flow.edges_to(40).count(), 2);
        assert_eq!(flow.edges_from(22).count(), 1);
        assert_eq!(flow.edge_count(), 2);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut flow = FlowIndex::new();
        let edge = JumpEdge {
            source: 0,
            dest: 8,
            opcode: OPCODE_JUMP,
        };
        flow.add_edge(edge);
        flow.add_edge(edge);
        assert_eq!(flow.edge_count(), 1);
    }
}
