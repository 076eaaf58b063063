//! End-to-end pipeline tests: listing load, disassembly, structure
//! recovery and serialization over synthetic script buffers.

use pretty_assertions::assert_eq;

use scm_core::opcode::Combination;
use scm_core::script::FlowKind;
use scm_core::serialize::intermediate_form;
use scm_core::{disassemble, Definition, OpcodeTable, OperandType};

const LISTING: &str = "\
[OPCODES]
; arithmetic and control
0001=1,wait %1d% ms
0002=1,goto %1d%
0004=2,%1d% = %2d% ; global store
0006=2,%1d% = %2d% ; local store
0038=2,%1d% > %2d%
004D=1,jump_if_false %1d%
004E=0,end_thread
";

/// Table with every operand type already concrete, the way it looks
/// after a first decode of each opcode has refined the listing slots.
fn typed_table() -> OpcodeTable {
    let mut t = OpcodeTable::new();
    t.register(Definition::new(0x0001, "wait $0 ms", &[OperandType::S32]));
    t.register(Definition::new(0x0002, "goto $0", &[OperandType::S32]));
    t.register(Definition::new(
        0x0006,
        "$0 = $1",
        &[OperandType::LocalIntFloat, OperandType::S8],
    ));
    t.register(Definition::new(
        0x0008,
        "$0 += $1",
        &[OperandType::LocalIntFloat, OperandType::S8],
    ));
    t.register(Definition::new(
        0x0038,
        "$0 > $1",
        &[OperandType::LocalIntFloat, OperandType::S8],
    ));
    t.register(Definition::new(
        0x004D,
        "jump_if_false $0",
        &[OperandType::S32],
    ));
    t.register(Definition::new(0x004E, "end_thread", &[]));
    t.register(Definition::new(0x0050, "gosub $0", &[OperandType::S32]));
    t.register(Definition::new(0x0051, "return", &[]));
    t.register(Definition::new(0x00D6, "if $0", &[OperandType::S8]));
    t
}

fn hex_script(s: &str) -> Vec<u8> {
    hex::decode(s.replace([' ', '\n'], "")).unwrap()
}

/// Loaded slots start out untyped and pick up their types from inline
/// tags in the stream; once refined, later occurrences carry bare
/// payloads and decode against the discovered types.
#[test]
fn listing_types_are_discovered_while_decoding() {
    let mut table = OpcodeTable::load_from_str(LISTING);

    // First wait carries an inline S32 tag; the second is bare.
    let bytes = hex_script("0100 01 e8030000 0100 0a000000");
    let script = disassemble(&bytes, &mut table);

    assert_eq!(script.instructions.len(), 2);
    assert_eq!(script.instructions[0].operands[0].as_i32(), 1000);
    assert_eq!(script.instructions[1].operands[0].as_i32(), 10);
    assert_eq!(script.instructions[1].size, 6);

    let def = table.lookup(0x0001).unwrap();
    assert_eq!(def.operands[0].ty, OperandType::S32);
}

/// Instruction spans tile a prefix of the buffer: offsets are strictly
/// increasing and each instruction starts where the previous ended.
#[test]
fn spans_reconstruct_a_buffer_prefix() {
    let mut table = OpcodeTable::load_from_str(LISTING);

    let bytes = hex_script(
        "0100 01 e8030000 \
         0600 03 0300 04 2a \
         0200 01 f4ffffff \
         4e00",
    );
    let script = disassemble(&bytes, &mut table);

    let mut expected_offset = 0i32;
    for inst in &script.instructions {
        assert_eq!(inst.offset, expected_offset);
        expected_offset += inst.size as i32;
    }
    assert_eq!(expected_offset as usize, bytes.len());
}

/// Forward and reverse jump indices always agree.
#[test]
fn jump_indices_are_symmetric() {
    let mut table = typed_table();

    // goto 12, wait 0, goto 0
    let bytes = hex_script(
        "0200 0c000000 \
         0100 00000000 \
         0200 00000000",
    );
    let mut script = disassemble(&bytes, &mut table);

    for pass in 0..2 {
        for inst in &script.instructions {
            if let Some(dest) = inst.jump_dest() {
                let forward: Vec<_> = script.flow.edges_from(inst.offset).collect();
                assert_eq!(forward.len(), 1, "pass {pass}");
                assert!(script.flow.edges_to(dest).any(|e| e.source == inst.offset));
            }
        }
        let instructions = script.instructions.clone();
        script.flow.rebuild(&instructions);
    }
}

/// The nop/setlocalint round trip: padding word, then opcode 0x0006
/// with payload `03 00 2a`.
#[test]
fn padding_then_local_store_round_trip() {
    let mut table = OpcodeTable::new();
    table.register(Definition::new(
        0x0006,
        "setlocalint $0 = $1",
        &[OperandType::LocalIntFloat, OperandType::S8],
    ));

    let bytes = hex_script("0000 0600 0300 2a");
    let script = disassemble(&bytes, &mut table);

    assert_eq!(script.instructions.len(), 1);
    let inst = &script.instructions[0];
    assert_eq!(inst.name, "setlocalint $0 = $1");
    assert_eq!(inst.operands.len(), 2);
    assert_eq!(inst.operands[1].as_i8(), 42);

    assert_eq!(intermediate_form(&script), "2:6[L3,B42]");
}

/// A full synthetic program: a counted while loop followed by a
/// procedure, reconstructed in one go.
#[test]
fn reconstructs_a_loop_and_a_procedure_together() {
    let mut table = typed_table();

    let mut bytes = Vec::new();
    let off = |b: &Vec<u8>| b.len() as i32;

    // local7 = 0
    bytes.extend(hex_script("0600 0700 00"));
    let if_off = off(&bytes);
    // if (local7 > 9)
    bytes.extend(hex_script("d600 00"));
    bytes.extend(hex_script("3800 0700 09"));
    bytes.extend(hex_script("4d00"));
    let jif_patch = bytes.len();
    bytes.extend([0; 4]);
    // body: gosub proc; local7 += 1; jump back
    bytes.extend(hex_script("5000"));
    let call_patch = bytes.len();
    bytes.extend([0; 4]);
    bytes.extend(hex_script("0800 0700 01"));
    let back_off = off(&bytes);
    bytes.extend(hex_script("0200"));
    bytes.extend((-if_off).to_le_bytes());
    let loop_exit = off(&bytes);
    bytes[jif_patch..jif_patch + 4].copy_from_slice(&(-loop_exit).to_le_bytes());
    // end_thread, then the procedure
    bytes.extend(hex_script("4e00"));
    let proc_off = off(&bytes);
    bytes.extend(hex_script("0100 32000000"));
    let ret_off = off(&bytes);
    bytes.extend(hex_script("5100"));
    bytes[call_patch..call_patch + 4].copy_from_slice(&(-proc_off).to_le_bytes());

    let mut script = disassemble(&bytes, &mut table);
    script.reconstruct(false);

    let cond = script.conditionals.get(&if_off).expect("conditional");
    assert_eq!(cond.count, 1);
    assert_eq!(cond.combination, Combination::None);
    assert_eq!(cond.flow, FlowKind::While);
    assert!(script.hidden.contains(&back_off));

    let looped = script.loops.get(&if_off).expect("loop");
    assert_eq!(looped.back_jump, back_off);
    assert_eq!(looped.counter.as_u16(), 7);
    // The counter write at offset 0 is where the backward scan stops,
    // and there is nothing before it to record as the setup.
    assert_eq!(looped.setup, None);

    let proc = script.procedures.get(&proc_off).expect("procedure");
    assert_eq!(proc.end, ret_off);
    assert_eq!(proc.name, format!("proc_{proc_off}"));
}

/// Optimizing twice changes nothing, and conditional jumps act as
/// barriers for threading.
#[test]
fn optimizer_fixed_point_and_conditional_barrier() {
    let mut table = typed_table();

    // 0: goto 6; 6: goto 12; 12: jump_if_false 18; 18: end_thread
    let bytes = hex_script(
        "0200 faffffff \
         0200 f4ffffff \
         4d00 eeffffff \
         4e00",
    );
    let mut script = disassemble(&bytes, &mut table);

    script.optimize_jumps();
    let once: Vec<_> = script.instructions.iter().map(|i| i.jump_dest()).collect();
    script.optimize_jumps();
    let twice: Vec<_> = script.instructions.iter().map(|i| i.jump_dest()).collect();

    assert_eq!(once, twice);
    // Threaded to the conditional at 12 and no further.
    assert_eq!(script.instructions[0].jump_dest(), Some(12));
}

/// Garbage opcodes degrade into placeholder occurrences, never a
/// failure.
#[test]
fn garbage_degrades_gracefully() {
    let mut table = OpcodeTable::load_from_str(LISTING);

    let bytes = hex_script("beef dead 0100 01 05000000 ff");
    let mut script = disassemble(&bytes, &mut table);

    assert_eq!(script.instructions.len(), 3);
    assert!(!script.instructions[0].is_known());
    assert!(!script.instructions[1].is_known());
    assert_eq!(script.instructions[0].offset, 0);
    assert_eq!(script.instructions[1].offset, 2);
    assert_eq!(script.instructions[2].name, "wait $0 ms");

    // Reconstruction over garbage is a no-op, not a crash.
    script.reconstruct(true);
    assert!(script.conditionals.is_empty());
}

/// A jump operand of `i32::MIN` has no positive absolute value; the
/// destination wraps instead of aborting the decode.
#[test]
fn extreme_jump_operand_does_not_abort() {
    let mut table = typed_table();

    // goto with operand 0x80000000, then end_thread.
    let bytes = hex_script("0200 00000080 4e00");
    let mut script = disassemble(&bytes, &mut table);

    assert_eq!(script.instructions[0].jump_dest(), Some(i32::MIN));

    // Threading finds no instruction there and leaves the jump alone.
    script.optimize_jumps();
    assert_eq!(script.instructions[0].jump_dest(), Some(i32::MIN));
    script.reconstruct(true);
}
