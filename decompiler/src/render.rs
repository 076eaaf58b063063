//! Pretty-printer for a reconstructed script.
//!
//! Output is source-like: conditionals and loops with their keyword
//! headers, call targets as named procedures, labels at raw jump
//! destinations, and an offset gutter on every line.

use std::collections::HashSet;
use std::io::Write;

use anyhow::{bail, Result};
use scm_core::opcode::{self, JumpKind, OPCODE_CALL, OPCODE_RETURN, OPCODE_WAIT};
use scm_core::operand::{Operand, OperandType};
use scm_core::script::{Conditional, FlowKind, ForLoop, Script};
use scm_core::Instruction;

/// Fill `$0`, `$1`, ... placeholders in a name template. Higher
/// indices are substituted first so `$1` never matches inside `$12`.
fn replace_tokens(template: &str, params: &[String]) -> String {
    let mut s = template.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        s = s.replace(&format!("${i}"), param);
    }
    s
}

fn global_name(script: &Script, offset: u16) -> String {
    match script.globals.get(&offset).and_then(|g| g.value_type) {
        Some(ty) => format!("g{}_{}", ty.name(), offset),
        None => format!("gVar_{offset}"),
    }
}

fn command_string(inst: &Instruction, params: &[String]) -> String {
    if inst.opcode == OPCODE_CALL {
        return params.first().cloned().unwrap_or_default();
    }
    replace_tokens(&inst.name, params)
}

pub struct Renderer {
    indent: usize,
    error_limit: usize,
    /// Locals already declared in the output; the first assignment to
    /// a local prints its type.
    known_locals: HashSet<i16>,
}

impl Renderer {
    pub fn new(indent: usize, error_limit: usize) -> Self {
        Self {
            indent,
            error_limit,
            known_locals: HashSet::new(),
        }
    }

    pub fn render(&mut self, script: &Script, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "/*")?;
        writeln!(out, "  Decompiled by the scm decompiler.")?;
        writeln!(out, "*/")?;
        writeln!(out)?;

        let mut consec_errors = 0usize;
        let mut last_was_if = false;

        let mut i = 0;
        while i < script.instructions.len() {
            let inst = &script.instructions[i];
            i += 1;

            if script.hidden.contains(&inst.offset) {
                continue;
            }

            let level = script.full_indent_level(inst.offset).max(0) as usize;
            let gutter_width = inst.offset.to_string().len();
            let indent = " ".repeat(level * self.indent);
            let pad = format!("/* {} */ {indent}", " ".repeat(gutter_width));
            let gutter = format!("/* {} */ {indent}", inst.offset);

            if let Some(label) = script.labels.get(&inst.offset) {
                writeln!(out, "{pad}")?;
                writeln!(out, "{pad}{}:", label.name)?;
            }

            if let Some(proc) = script.procedures.get(&inst.offset) {
                // Declarations sit one level out from the body.
                let decl_indent = " ".repeat(level.saturating_sub(1) * self.indent);
                writeln!(
                    out,
                    "/* {} */ {decl_indent}proc {}()",
                    " ".repeat(gutter_width),
                    proc.name
                )?;
                last_was_if = true;
            }

            if let Some(cond) = script.conditionals.get(&inst.offset) {
                if !last_was_if {
                    writeln!(out, "{pad}")?;
                }
                if let Some(looped) = script.loops.get(&inst.offset) {
                    let summary = self.for_string(script, looped, cond);
                    writeln!(out, "{pad}// {summary}")?;
                }
                writeln!(out, "{gutter}{}", self.conditional_string(script, cond))?;
                last_was_if = true;

                // The conditions and the false-jump are part of the
                // header line; resume at the body.
                if let Some(body_idx) = script.index_of(cond.body_start) {
                    i = body_idx;
                }
                continue;
            }

            last_was_if = false;

            if let Some(kind) = inst.jump_kind() {
                if let Some(dest) = inst.jump_dest() {
                    if dest < inst.offset {
                        writeln!(out, "{pad}// Backwards jump")?;
                    }
                    if kind != JumpKind::Call {
                        if let Some(label) = script.labels.get(&dest) {
                            let line = replace_tokens(&inst.name, &[label.name.clone()]);
                            writeln!(out, "{gutter}{line};")?;
                            continue;
                        }
                    }
                }
            }

            if !inst.is_known() {
                consec_errors += 1;
                if consec_errors >= self.error_limit {
                    bail!("giving up after {consec_errors} consecutive unknown opcodes");
                }
                writeln!(out, "{gutter}/* unknown: 0x{:04x} */", inst.opcode)?;
                continue;
            }
            consec_errors = 0;

            let params = self.param_strings(script, inst);
            writeln!(out, "{gutter}{};", command_string(inst, &params))?;

            if inst.opcode == OPCODE_RETURN {
                writeln!(out, "{pad}")?;
            }
        }

        Ok(())
    }

    fn conditional_string(&mut self, script: &Script, cond: &Conditional) -> String {
        let keyword = match cond.flow {
            FlowKind::If => "if",
            FlowKind::While => "while",
        };
        let suffix = match cond.combination {
            opcode::Combination::None => "",
            opcode::Combination::And => "_all",
            opcode::Combination::Or => "_one_of",
        };

        let mut s = format!("{keyword}{suffix}(");

        if let (Some(start), Some(end)) = (
            script.index_of(cond.condition_start),
            script.index_of(cond.condition_end),
        ) {
            for idx in start + 1..=end {
                let inst = &script.instructions[idx];
                if inst.is_known() {
                    let params = self.param_strings(script, inst);
                    s.push_str(&replace_tokens(&inst.name, &params));
                } else {
                    s.push_str("unknown condition");
                }
                if idx != end {
                    s.push_str(", ");
                }
            }
        }

        s.push(')');
        s
    }

    /// Informational `for(setup; check; step)` summary shown above a
    /// loop header. The setup is a guess and may be missing.
    fn for_string(&mut self, script: &Script, looped: &ForLoop, cond: &Conditional) -> String {
        let setup = looped
            .setup
            .and_then(|off| script.at_offset(off))
            .map(|inst| {
                let params = self.param_strings(script, inst);
                command_string(inst, &params)
            })
            .unwrap_or_else(|| "?".to_string());

        let header = self.conditional_string(script, cond);
        let check = match header.find('(') {
            Some(open) => header[open..].to_string(),
            None => header,
        };

        let step = script
            .at_offset(looped.step)
            .map(|inst| {
                let params = self.param_strings(script, inst);
                command_string(inst, &params)
            })
            .unwrap_or_else(|| "?".to_string());

        format!("for({setup}; {check}; {step})")
    }

    fn param_strings(&mut self, script: &Script, inst: &Instruction) -> Vec<String> {
        if inst.opcode == OPCODE_CALL {
            if let Some(dest) = inst.jump_dest() {
                if let Some(proc) = script.procedures.get(&dest) {
                    return vec![format!("{}()", proc.name)];
                }
            }
        }

        inst.operands
            .iter()
            .enumerate()
            .map(|(i, op)| {
                if op.ty().is_array() {
                    self.array_string(script, op)
                } else {
                    self.value_string(script, inst, i, op)
                }
            })
            .collect()
    }

    fn array_string(&mut self, script: &Script, op: &Operand) -> String {
        let Some(arr) = op.array_ref() else {
            return "<array>".to_string();
        };

        let index = if arr.index_is_global {
            global_name(script, arr.index as u16)
        } else {
            format!("localIntFloat_{}", arr.index)
        };

        let mut s = format!("l{}Arr_{}[{index}]", arr.elem_type.name(), arr.offset);
        if arr.index_is_global {
            s.push_str("_index_is_global");
        }
        s
    }

    fn value_string(
        &mut self,
        script: &Script,
        inst: &Instruction,
        idx: usize,
        op: &Operand,
    ) -> String {
        if op.ty().is_global_ref() {
            if let Some(var) = script.globals.get(&op.as_u16()) {
                if var.value_type.is_some() {
                    return global_name(script, op.as_u16());
                }
            }
        }

        let sum = op.sum_bytes();
        // 0 and 1 read fine without a type annotation.
        let mut print_type = sum >= 2;
        let mut value = op.to_string();

        if inst.operands.len() == 1
            && op.ty() == OperandType::S8
            && inst.opcode != OPCODE_WAIT
            && sum < 2
        {
            // A lone byte operand is usually a flag. wait() takes a
            // real count, so it keeps the number.
            value = if sum == 1 { "true" } else { "false" }.to_string();
        }

        let ty_name = op.ty().name();
        if op.ty().is_local_ref() {
            print_type = false;
            value = format!("local{}_{}", &ty_name[1..], op.as_i16());

            if idx == 0
                && !self.known_locals.contains(&op.as_i16())
                && opcode::is_assignment(inst.opcode)
            {
                value = format!("{ty_name} {value}");
            }
            self.known_locals.insert(op.as_i16());
        }

        if print_type {
            format!("({ty_name}){value}")
        } else {
            value
        }
    }
}
