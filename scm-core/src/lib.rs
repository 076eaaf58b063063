//! Core library for the scm toolchain: mission-script bytecode
//! decoding, control-flow indexing, structure recovery and jump
//! optimization.
//!
//! The usual pipeline is [`table::OpcodeTable::load_from_file`] to get
//! the command definitions, [`disasm::disassemble`] over the raw
//! buffer, then [`script::Script::reconstruct`] to recover
//! conditionals, loops, procedures, labels and globals.

pub mod cursor;
pub mod decoder;
pub mod disasm;
pub mod error;
pub mod flow;
pub mod opcode;
pub mod operand;
pub mod optimize;
pub mod script;
pub mod serialize;
pub mod structure;
pub mod table;

pub use decoder::Instruction;
pub use disasm::disassemble;
pub use error::DecodeError;
pub use operand::{Operand, OperandType};
pub use script::Script;
pub use table::{Definition, OpcodeTable};
