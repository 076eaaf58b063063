//! Single-instruction decoding against an [`OpcodeTable`].

use log::{trace, warn};

use crate::cursor::Cursor;
use crate::error::DecodeError;
use crate::opcode::{self, JumpKind, OPCODE_JUMP, OPCODE_NOP};
use crate::operand::{Operand, OperandType};
use crate::table::OpcodeTable;

/// One decoded occurrence of a command in a script.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: u16,
    /// Byte offset of the opcode word within the script.
    pub offset: i32,
    /// Display template from the table; empty for unknown opcodes.
    pub name: String,
    pub operands: Vec<Operand>,
    /// Position in the decoded instruction list.
    pub index: usize,
    /// Total encoded size in bytes, opcode word included.
    pub size: usize,
}

impl Instruction {
    pub fn is_known(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn jump_kind(&self) -> Option<JumpKind> {
        opcode::jump_kind(self.opcode)
    }

    /// Absolute destination of a jump. Encoders emit negative offsets
    /// for targets inside the current script block. Wrapping keeps a
    /// corrupt `i32::MIN` operand from aborting the decode.
    pub fn jump_dest(&self) -> Option<i32> {
        if self.jump_kind().is_none() {
            return None;
        }
        self.operands.first().map(|p| p.as_i32().wrapping_abs())
    }

    /// The offset of this instruction, except for an unconditional
    /// jump where it is the destination. Lets a pass treat a jump as
    /// being wherever it lands.
    pub fn effective_offset(&self) -> i32 {
        if self.opcode == OPCODE_JUMP {
            if let Some(dest) = self.jump_dest() {
                return dest;
            }
        }
        self.offset
    }
}

/// Decode the instruction at the cursor position.
///
/// Returns `None` for a zero opcode word, which scripts use as
/// padding. An opcode missing from the table yields a nameless
/// occurrence spanning only the opcode word, so the next decode
/// attempt resynchronizes two bytes later. A table slot of unknown
/// type is refined in place from the tag discovered in the stream.
pub fn decode_one(
    cur: &mut Cursor<'_>,
    table: &mut OpcodeTable,
    index: usize,
) -> Option<Instruction> {
    let start = cur.pos();
    let opcode = match cur.read_u16() {
        Ok(op) => op,
        Err(_) => {
            cur.seek(cur.len());
            return None;
        }
    };

    if opcode == OPCODE_NOP {
        return None;
    }

    let Some(def) = table.lookup(opcode) else {
        trace!("unknown opcode 0x{opcode:04x} at offset {start}");
        return Some(Instruction {
            opcode,
            offset: start as i32,
            name: String::new(),
            operands: Vec::new(),
            index,
            size: 2,
        });
    };

    let name = def.name.clone();
    let slots: Vec<OperandType> = def.operands.iter().map(|s| s.ty).collect();

    let mut operands = Vec::with_capacity(slots.len());
    for (i, expected) in slots.into_iter().enumerate() {
        match Operand::read(cur, expected) {
            Ok(op) => {
                if expected == OperandType::Unknown {
                    table.refine(opcode, i, op.ty());
                }
                operands.push(op);
            }
            Err(DecodeError::UnknownOperandTag { tag, offset }) => {
                // Desynchronized: treat the word as an unknown opcode
                // and retry the operand bytes as instructions.
                warn!("operand tag 0x{tag:02x} at offset {offset} out of range, dropping opcode 0x{opcode:04x}");
                cur.seek(start + 2);
                return Some(Instruction {
                    opcode,
                    offset: start as i32,
                    name: String::new(),
                    operands: Vec::new(),
                    index,
                    size: 2,
                });
            }
            Err(DecodeError::UnexpectedEof { .. }) => {
                // Truncated trailing instruction; keep what decoded.
                cur.seek(cur.len());
                break;
            }
        }
    }

    Some(Instruction {
        opcode,
        offset: start as i32,
        name,
        operands,
        index,
        size: cur.pos() - start,
    })
}
