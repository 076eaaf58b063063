//! The decoded script and everything reconstructed on top of it.

use std::collections::{BTreeMap, BTreeSet};

use crate::decoder::Instruction;
use crate::flow::FlowIndex;
use crate::opcode::Combination;
use crate::operand::{Operand, OperandType};

/// How a reconstructed conditional reads in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    If,
    While,
}

/// A structured conditional: the `if` header, its condition commands,
/// the conditional jump that skips the body, and the body span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    /// Offset of the `if` header command.
    pub condition_start: i32,
    /// Offset of the last condition command.
    pub condition_end: i32,
    /// Offset of the jump-if-false command after the conditions.
    pub jump_offset: i32,
    pub body_start: i32,
    /// Offset of the last command inside the body.
    pub body_end: i32,
    pub count: i32,
    pub combination: Combination,
    pub flow: FlowKind,
}

impl Conditional {
    pub fn body_contains(&self, offset: i32) -> bool {
        self.body_start <= offset && offset <= self.body_end
    }
}

/// A counted loop recognized from a conditional plus its surroundings.
/// The setup command is a heuristic guess and may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub counter: Operand,
    pub setup: Option<i32>,
    pub check_start: i32,
    pub check_end: i32,
    /// Offset of the increment or decrement command.
    pub step: i32,
    /// Offset of the jump back to the condition.
    pub back_jump: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub start: i32,
    pub end: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub offset: i32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalVar {
    pub offset: u16,
    pub reference_type: OperandType,
    /// Type assigned into the variable, once an assignment reveals it.
    pub value_type: Option<OperandType>,
}

/// A fully decoded script: the instruction list plus the control-flow
/// index and all structure recovered from it.
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub instructions: Vec<Instruction>,
    /// Byte offset of each instruction to its list index.
    pub offset_index: BTreeMap<i32, usize>,
    pub flow: FlowIndex,

    /// Conditionals keyed by the offset of their `if` header.
    pub conditionals: BTreeMap<i32, Conditional>,
    /// Counted loops keyed by the offset of their `if` header.
    pub loops: BTreeMap<i32, ForLoop>,
    pub procedures: BTreeMap<i32, Procedure>,
    pub labels: BTreeMap<i32, Label>,
    pub globals: BTreeMap<u16, GlobalVar>,
    /// Offsets suppressed from output: structural jumps and dead code.
    pub hidden: BTreeSet<i32>,
}

impl Script {
    pub fn index_of(&self, offset: i32) -> Option<usize> {
        self.offset_index.get(&offset).copied()
    }

    pub fn at_offset(&self, offset: i32) -> Option<&Instruction> {
        self.index_of(offset).map(|i| &self.instructions[i])
    }

    pub fn before(&self, inst: &Instruction) -> Option<&Instruction> {
        let i = self.index_of(inst.offset)?;
        i.checked_sub(1).map(|i| &self.instructions[i])
    }

    pub fn offset_before(&self, offset: i32) -> Option<i32> {
        let inst = self.at_offset(offset)?;
        self.before(inst).map(|prev| prev.offset)
    }

    /// Number of conditional bodies the offset lies inside.
    pub fn if_level_for(&self, offset: i32) -> i32 {
        self.conditionals
            .values()
            .filter(|c| c.body_contains(offset))
            .count() as i32
    }

    /// Indent depth for output: conditional nesting plus one inside a
    /// procedure, but a conditional only counts inside a procedure when
    /// it lies entirely within that procedure.
    pub fn full_indent_level(&self, offset: i32) -> i32 {
        let mut lvl = 0;

        let mut enclosing = None;
        for proc in self.procedures.values() {
            if proc.start <= offset && offset <= proc.end {
                enclosing = Some(proc);
                lvl += 1;
            }
        }

        for cond in self.conditionals.values() {
            if !cond.body_contains(offset) {
                continue;
            }
            match enclosing {
                Some(proc) => {
                    if proc.start <= cond.condition_start && cond.body_end <= proc.end {
                        lvl += 1;
                    }
                }
                None => lvl += 1,
            }
        }

        lvl
    }

    /// First offset at or after `start` that some jump lands on.
    pub fn next_jumped_to(&self, start: i32) -> Option<i32> {
        let idx = self.index_of(start)?;
        self.instructions[idx..]
            .iter()
            .map(|inst| inst.offset)
            .find(|&offset| self.flow.is_jump_destination(offset))
    }
}
