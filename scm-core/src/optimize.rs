//! Jump threading: rewrite jumps that land on other jumps so they go
//! straight to the final destination.

use std::collections::BTreeSet;

use log::debug;

use crate::opcode::{OPCODE_CALL, OPCODE_JUMP};
use crate::operand::Operand;
use crate::script::Script;

impl Script {
    /// Collapse jump chains. Only unconditional jumps and calls can be
    /// threaded through; a conditional target ends the chain, since
    /// following it would need knowledge of the condition's outcome.
    ///
    /// Scripts can contain jump cycles (`a -> b -> a`), so each chain
    /// tracks the destinations it has seen and stops on a repeat.
    pub fn optimize_jumps(&mut self) {
        let mut rewrites: Vec<(usize, Operand)> = Vec::new();

        for (idx, inst) in self.instructions.iter().enumerate() {
            if inst.jump_kind().is_none() {
                continue;
            }
            let Some(mut dest) = inst.jump_dest() else {
                continue;
            };

            let mut seen = BTreeSet::new();
            let mut threaded: Option<Operand> = None;

            loop {
                if !seen.insert(dest) {
                    break;
                }
                let Some(target) = self.at_offset(dest) else {
                    break;
                };
                if target.opcode != OPCODE_JUMP && target.opcode != OPCODE_CALL {
                    break;
                }
                let Some(param) = target.operands.first() else {
                    break;
                };
                dest = param.as_i32().wrapping_abs();
                threaded = Some(param.clone());
            }

            if let Some(param) = threaded {
                rewrites.push((idx, param));
            }
        }

        debug!("threaded {} jump chains", rewrites.len());

        for (idx, param) in rewrites {
            if let Some(op) = self.instructions[idx].operands.first_mut() {
                *op = param;
            }
        }

        // Both jump indices must always be rebuilt together.
        self.flow.rebuild(&self.instructions);
    }
}
