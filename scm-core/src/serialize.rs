//! Textual intermediate form: one line per instruction, each operand
//! tagged with a single type letter so the encoding re-parses without
//! the opcode table.

use std::fmt::Write;

use itertools::Itertools;

use crate::operand::{Operand, OperandType};
use crate::script::Script;

/// Serialize the whole instruction list. Lines look like
/// `20:6[L3,B42]`, with opcodes and values in decimal.
pub fn intermediate_form(script: &Script) -> String {
    let mut out = String::new();

    for (i, inst) in script.instructions.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }

        let _ = write!(out, "{}:{}[", inst.offset, inst.opcode);
        for (j, operand) in inst.operands.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            out.push_str(&operand_form(operand));
        }
        out.push(']');
    }

    out
}

/// Dot-joined decimal byte list, or `!` when the payload is empty.
fn byte_list(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "!".to_string();
    }
    bytes.iter().map(|b| b.to_string()).join(".")
}

fn quoted(operand: &Operand) -> String {
    let end = operand
        .bytes()
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(operand.len());
    format!(
        "'{}'",
        String::from_utf8_lossy(&operand.bytes()[..end])
    )
}

fn operand_form(operand: &Operand) -> String {
    use OperandType::*;
    match operand.ty() {
        EndMarker => "E".to_string(),
        S32 => format!("S{}", operand.as_i32()),
        GlobalIntFloat => format!("G{}", operand.as_u16()),
        LocalIntFloat => format!("L{}", operand.as_u16()),
        S8 => format!("B{}", operand.as_i8()),
        S16 => format!("T{}", operand.as_i16()),
        F32 => format!("F{}", operand.as_f32()),
        GlobalIntFloatArr => format!("A{}", byte_list(operand.bytes())),
        LocalIntFloatArr => format!("X{}", byte_list(operand.bytes())),
        String8 | StringVar | String16 => quoted(operand),
        GlobalString8 => format!("M{}", operand.as_u16()),
        LocalString8 => format!("N{}", operand.as_u16()),
        GlobalString8Arr => format!("V{}", byte_list(operand.bytes())),
        LocalString8Arr => format!("W{}", byte_list(operand.bytes())),
        GlobalString16 => format!("K{}", operand.as_u16()),
        LocalString16 => format!("J{}", operand.as_u16()),
        GlobalString16Arr => format!("R{}", byte_list(operand.bytes())),
        LocalString16Arr => format!("Z{}", byte_list(operand.bytes())),
        Unknown => "U!".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Instruction;
    use pretty_assertions::assert_eq;

    fn inst(opcode: u16, offset: i32, operands: Vec<Operand>) -> Instruction {
        Instruction {
            opcode,
            offset,
            name: "x".into(),
            operands,
            index: 0,
            size: 0,
        }
    }

    #[test]
    fn tags_scalars_with_type_letters() {
        let mut script = Script::default();
        script.instructions.push(inst(
            0x0006,
            20,
            vec![
                Operand::new(OperandType::LocalIntFloat, vec![0x03, 0x00]),
                Operand::new(OperandType::S8, vec![0x2a]),
            ],
        ));
        script.instructions.push(inst(
            0x0001,
            25,
            vec![Operand::new(OperandType::S32, vec![0xf4, 0xff, 0xff, 0xff])],
        ));

        assert_eq!(intermediate_form(&script), "20:6[L3,B42]\n25:1[S-12]");
    }

    #[test]
    fn arrays_serialize_as_dotted_bytes_and_empty_as_bang() {
        let arr = Operand::new(
            OperandType::GlobalIntFloatArr,
            vec![0x40, 0x01, 0x02, 0x00, 0x08, 0x00],
        );
        assert_eq!(operand_form(&arr), "A64.1.2.0.8.0");

        let empty = Operand::new(OperandType::GlobalIntFloatArr, Vec::new());
        assert_eq!(operand_form(&empty), "A!");

        let unknown = Operand::new(OperandType::Unknown, Vec::new());
        assert_eq!(operand_form(&unknown), "U!");
    }

    #[test]
    fn strings_and_markers() {
        let s = Operand::new(OperandType::StringVar, b"hi\0\0".to_vec());
        assert_eq!(operand_form(&s), "'hi'");

        let end = Operand::new(OperandType::EndMarker, Vec::new());
        assert_eq!(operand_form(&end), "E");

        let g16 = Operand::new(OperandType::GlobalString16, vec![0x10, 0x00]);
        assert_eq!(operand_form(&g16), "K16");
    }
}
