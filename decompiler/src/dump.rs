//! Flat YAML listing of a disassembled script.

use serde::{Deserialize, Serialize};

use scm_core::Script;

#[derive(Debug, Serialize, Deserialize)]
pub struct Inst {
    address: i32,
    mnemonic: String,
    operands: Vec<String>,
}

pub fn listing(script: &Script) -> Vec<Inst> {
    script
        .instructions
        .iter()
        .map(|inst| Inst {
            address: inst.offset,
            mnemonic: if inst.is_known() {
                inst.name.clone()
            } else {
                format!("unknown_0x{:04x}", inst.opcode)
            },
            operands: inst.operands.iter().map(|op| op.to_string()).collect(),
        })
        .collect()
}
