//! Linear sweep over a script buffer.

use log::{debug, warn};

use crate::cursor::Cursor;
use crate::decoder::decode_one;
use crate::script::Script;
use crate::table::OpcodeTable;

/// Decode the whole buffer front to back into a [`Script`].
///
/// Padding words are skipped, unknown opcodes become two-byte
/// placeholder occurrences, and a lone trailing byte is dropped. The
/// jump index is built as part of the sweep, so the result is ready
/// for structure recovery.
pub fn disassemble(bytes: &[u8], table: &mut OpcodeTable) -> Script {
    let mut script = Script::default();
    let mut cur = Cursor::new(bytes);

    while !cur.at_end() {
        if cur.remaining() < 2 {
            warn!("dropping trailing byte at offset {}", cur.pos());
            break;
        }

        let index = script.instructions.len();
        let Some(inst) = decode_one(&mut cur, table, index) else {
            continue;
        };

        script.offset_index.insert(inst.offset, index);
        script.instructions.push(inst);
    }

    script.flow.rebuild(&script.instructions);

    debug!(
        "disassembled {} instructions, {} jump edges",
        script.instructions.len(),
        script.flow.edge_count()
    );

    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::OperandType;
    use crate::table::Definition;
    use pretty_assertions::assert_eq;

    fn table() -> OpcodeTable {
        let mut t = OpcodeTable::new();
        t.register(Definition::new(0x0001, "wait $0 ms", &[OperandType::S32]));
        t.register(Definition::new(0x0002, "goto $0", &[OperandType::S32]));
        t.register(Definition::new(
            0x0006,
            "setlocalint $0 = $1",
            &[OperandType::LocalIntFloat, OperandType::S8],
        ));
        t
    }

    #[test]
    fn skips_padding_and_indexes_offsets() {
        // nop, setlocalint local3 = 42, wait 100
        let bytes = [
            0x00, 0x00, // padding
            0x06, 0x00, 0x03, 0x00, 0x2a, // local store
            0x01, 0x00, 0x64, 0x00, 0x00, 0x00, // wait
        ];
        let mut table = table();
        let script = disassemble(&bytes, &mut table);

        assert_eq!(script.instructions.len(), 2);
        assert_eq!(script.instructions[0].offset, 2);
        assert_eq!(script.instructions[1].offset, 7);
        assert_eq!(script.index_of(7), Some(1));
        assert_eq!(script.instructions[1].index, 1);
    }

    #[test]
    fn builds_jump_edges_during_the_sweep() {
        // goto -12 jumps over wait 0 and lands on wait 1.
        let bytes = [
            0x02, 0x00, 0xf4, 0xff, 0xff, 0xff, // goto -12 => dest 12
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, // wait 0
            0x01, 0x00, 0x01, 0x00, 0x00, 0x00, // wait 1 at 12
        ];
        let mut table = table();
        let script = disassemble(&bytes, &mut table);

        assert_eq!(script.flow.edge_count(), 1);
        assert!(script.flow.is_jump_source(0));
        assert!(script.flow.is_jump_destination(12));
    }

    #[test]
    fn lone_trailing_byte_is_dropped() {
        let bytes = [0x01, 0x00, 0x64, 0x00, 0x00, 0x00, 0x7f];
        let mut table = table();
        let script = disassemble(&bytes, &mut table);
        assert_eq!(script.instructions.len(), 1);
    }

    #[test]
    fn unknown_opcode_resynchronizes_two_bytes_later() {
        let bytes = [
            0x99, 0x09, // not in the table
            0x01, 0x00, 0x0a, 0x00, 0x00, 0x00, // wait 10
        ];
        let mut table = table();
        let script = disassemble(&bytes, &mut table);

        assert_eq!(script.instructions.len(), 2);
        assert!(!script.instructions[0].is_known());
        assert_eq!(script.instructions[0].size, 2);
        assert_eq!(script.instructions[1].name, "wait $0 ms");
    }
}
