use thiserror::Error;

/// Errors raised while decoding raw script bytes.
///
/// These never cross the pipeline boundary directly: the disassembler
/// converts them into unknown occurrences or a truncated tail.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of buffer at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("operand tag 0x{tag:02x} outside valid range at offset {offset}")]
    UnknownOperandTag { tag: u8, offset: usize },
}
