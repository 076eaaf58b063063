//! Structure recovery: conditionals, loops, procedures, labels,
//! globals and dead-code hiding, layered over the flat instruction
//! list in a fixed pass order.

use log::{debug, info};

use crate::opcode::{
    condition_combo, JumpKind, OPCODE_CALL, OPCODE_IF, OPCODE_JUMP, OPCODE_JUMP_IF_FALSE,
    OPCODE_RETURN,
};
use crate::script::{Conditional, FlowKind, ForLoop, GlobalVar, Label, Procedure, Script};

/// Cap on conditional-discovery passes. Each pass can only add
/// statements, so the fixed point is normally reached in two or three.
const MAX_CONDITIONAL_PASSES: usize = 100;

impl Script {
    /// Run every recovery pass in order. `clean` additionally hides
    /// code that can never execute.
    pub fn reconstruct(&mut self, clean: bool) {
        info!("recovering conditionals");
        let mut last = self.conditionals.len();
        for pass in 1..=MAX_CONDITIONAL_PASSES {
            self.discover_conditionals();
            let now = self.conditionals.len();
            debug!("pass {pass}: {now} conditionals");
            if now == last {
                break;
            }
            last = now;
        }

        info!("recovering counted loops");
        self.discover_loops();

        info!("recovering procedures");
        self.discover_procedures();

        info!("reclassifying while loops");
        self.reclassify_while_loops();

        if clean {
            info!("hiding dead code");
            self.hide_dead_code();
        }

        info!("placing labels");
        self.discover_labels();

        info!("collecting globals");
        self.discover_globals();

        debug!(
            "{} conditionals, {} loops, {} procedures, {} labels, {} globals",
            self.conditionals.len(),
            self.loops.len(),
            self.procedures.len(),
            self.labels.len(),
            self.globals.len()
        );
    }

    fn discover_conditionals(&mut self) {
        let headers: Vec<usize> = self
            .instructions
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.opcode == OPCODE_IF)
            .map(|(i, _)| i)
            .collect();

        for i in headers {
            if let Some(cond) = self.conditional_from_index(i) {
                self.conditionals.insert(cond.condition_start, cond);
            }
        }
    }

    /// Try to read a full conditional starting at the `if` header at
    /// list index `i`. Layout in the stream:
    ///
    /// ```text
    /// if <sub-code>
    /// <condition> x count
    /// jump_if_false <past body>
    /// <body ...>
    /// ```
    fn conditional_from_index(&self, i: usize) -> Option<Conditional> {
        let header = &self.instructions[i];
        if header.opcode != OPCODE_IF || self.conditionals.contains_key(&header.offset) {
            return None;
        }

        let sub_code = header.operands.first()?.as_i32();
        let (count, combination) = condition_combo(sub_code)?;
        if count < 1 {
            return None;
        }

        let last_cond = i + count as usize;
        let jif = last_cond + 1;
        if jif >= self.instructions.len() {
            return None;
        }

        // An unknown opcode among the conditions means the stream was
        // misread there and the counting cannot be trusted.
        if self.instructions[i + 1..last_cond]
            .iter()
            .any(|inst| !inst.is_known())
        {
            return None;
        }

        let condition_end = self.instructions[last_cond].offset;

        let jif_inst = &self.instructions[jif];
        if jif_inst.opcode != OPCODE_JUMP_IF_FALSE {
            return None;
        }
        let target = jif_inst.jump_dest()?;

        let body_first = jif + 1;
        if body_first >= self.instructions.len() {
            return None;
        }
        let body_start = self.instructions[body_first].offset;

        // The false-jump lands just past the body.
        let mut body_end = None;
        for inst in &self.instructions[body_first..] {
            if inst.offset == target {
                break;
            }
            body_end = Some(inst.offset);
        }

        Some(Conditional {
            condition_start: header.offset,
            condition_end,
            jump_offset: jif_inst.offset,
            body_start,
            body_end: body_end?,
            count,
            combination,
            flow: FlowKind::If,
        })
    }

    /// Recognize counted loops: a conditional whose false-jump target
    /// is preceded by a jump back to the `if` header, with an
    /// increment or decrement command just before that back jump.
    fn discover_loops(&mut self) {
        let mut found = Vec::new();

        for (&if_offset, cond) in &self.conditionals {
            let Some(jif) = self.at_offset(cond.jump_offset) else {
                continue;
            };
            let Some(target) = jif.jump_dest() else {
                continue;
            };
            let Some(target_idx) = self.index_of(target) else {
                continue;
            };
            let Some(back_idx) = target_idx.checked_sub(1) else {
                continue;
            };

            let back_jump = &self.instructions[back_idx];
            if back_jump.jump_kind().is_none() || back_jump.jump_dest() != Some(if_offset) {
                continue;
            }

            let Some(step) = self.before(back_jump) else {
                continue;
            };
            if !step.name.contains(['+', '-']) {
                continue;
            }
            let Some(counter) = step.operands.first().cloned() else {
                continue;
            };

            let Some(check_end) = self.offset_before(cond.condition_end) else {
                continue;
            };

            // Walk backwards from the condition looking for a command
            // that touches the counter; the one before that is taken
            // as the loop setup. Best effort, often wrong, but the
            // result is only ever shown as an informational comment.
            let mut setup = None;
            let mut cursor = self
                .at_offset(cond.condition_start)
                .and_then(|inst| self.before(inst));
            while let Some(candidate) = cursor {
                let stops = candidate.name == "$0 = $1"
                    || candidate.operands.len() == 2
                    || candidate.operands.contains(&counter);
                if stops {
                    setup = self.before(candidate).map(|inst| inst.offset);
                    break;
                }
                if candidate.offset == 0 {
                    break;
                }
                cursor = self.before(candidate);
            }

            found.push((
                if_offset,
                ForLoop {
                    counter,
                    setup,
                    check_start: cond.condition_start,
                    check_end,
                    step: step.offset,
                    back_jump: back_jump.offset,
                },
            ));
        }

        for (offset, looped) in found {
            self.loops.insert(offset, looped);
        }
    }

    /// Every call target starts a procedure; it extends to the first
    /// return reachable at the same nesting level as the entry.
    fn discover_procedures(&mut self) {
        for i in 0..self.instructions.len() {
            if self.instructions[i].opcode != OPCODE_CALL {
                continue;
            }
            let Some(start) = self.instructions[i].jump_dest() else {
                continue;
            };
            if self.procedures.contains_key(&start) {
                continue;
            }
            let Some(start_idx) = self.index_of(start) else {
                continue;
            };

            let start_level = self.if_level_for(start);
            let mut end = start;

            for inst in &self.instructions[start_idx..] {
                end = inst.offset;

                // Follow unconditional jumps so a trailing
                // `jump -> return` still terminates the procedure.
                let effective = self
                    .index_of(inst.effective_offset())
                    .map(|k| self.instructions[k].opcode);
                if effective == Some(OPCODE_RETURN) && self.if_level_for(end) == start_level {
                    break;
                }
            }

            self.procedures.insert(
                start,
                Procedure {
                    start,
                    end,
                    name: format!("proc_{start}"),
                },
            );
        }
    }

    /// A backward jump whose destination carries a recovered
    /// conditional is that conditional re-run: a while loop. The back
    /// jump itself becomes structural and is hidden.
    fn reclassify_while_loops(&mut self) {
        for inst in &self.instructions {
            if inst.jump_kind().is_none() {
                continue;
            }
            let Some(dest) = inst.jump_dest() else {
                continue;
            };
            if dest >= inst.offset {
                continue;
            }
            if let Some(cond) = self.conditionals.get_mut(&dest) {
                cond.flow = FlowKind::While;
                self.hidden.insert(inst.offset);
            }
        }
    }

    /// Place a label at every jump destination that is not already
    /// explained by a recovered conditional. Hidden jumps are
    /// structural and get no label.
    fn discover_labels(&mut self) {
        for inst in &self.instructions {
            if self.hidden.contains(&inst.offset) {
                continue;
            }
            let kind = inst.jump_kind();
            if kind.is_none() || kind == Some(JumpKind::Call) {
                continue;
            }
            let Some(dest) = inst.jump_dest() else {
                continue;
            };
            if self.hidden.contains(&dest) || self.conditionals.contains_key(&dest) {
                continue;
            }

            self.labels.insert(
                dest,
                Label {
                    offset: dest,
                    name: format!("label_{dest}"),
                },
            );
        }
    }

    /// Collect every global storage reference, and where a two-operand
    /// assignment mentions one, record the assigned type. A global
    /// assigned from another global inherits that one's value type
    /// when it is already known.
    fn discover_globals(&mut self) {
        for inst in &self.instructions {
            let is_assignment =
                inst.operands.len() == 2 && inst.name.matches('=').count() == 1;

            for (i, operand) in inst.operands.iter().enumerate() {
                if !operand.ty().is_global_ref() {
                    continue;
                }
                let offset = operand.as_u16();

                let var = self.globals.entry(offset).or_insert(GlobalVar {
                    offset,
                    reference_type: operand.ty(),
                    value_type: None,
                });
                var.reference_type = operand.ty();

                if !is_assignment {
                    continue;
                }

                let other = &inst.operands[1 - i];
                let value_type = if other.ty().is_global_ref() {
                    // Chase one level into the source global; if it
                    // has no record yet there is nothing to learn.
                    let Some(src) = self.globals.get(&other.as_u16()) else {
                        break;
                    };
                    src.value_type
                } else {
                    Some(other.ty())
                };

                match value_type {
                    Some(ty) if ty != crate::operand::OperandType::EndMarker => {
                        // First assignment wins; the type is never
                        // downgraded by later stores.
                        if let Some(var) = self.globals.get_mut(&offset) {
                            var.value_type.get_or_insert(ty);
                        }
                    }
                    _ => {
                        self.globals.remove(&offset);
                    }
                }
            }
        }
    }

    /// Code after an unconditional jump that nothing ever jumps to can
    /// never run. Hide it up to the next jump destination.
    fn hide_dead_code(&mut self) {
        let mut doomed = Vec::new();

        for inst in &self.instructions {
            if inst.opcode != OPCODE_JUMP {
                continue;
            }
            let Some(idx) = self.index_of(inst.offset) else {
                continue;
            };

            for dead in &self.instructions[idx + 1..] {
                if self.flow.is_jump_destination(dead.offset) {
                    break;
                }
                doomed.push(dead.offset);
            }
        }

        self.hidden.extend(doomed);
    }
}
