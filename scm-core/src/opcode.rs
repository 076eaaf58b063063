//! Well-known opcode numbers and the jump taxonomy built on them.

pub const OPCODE_NOP: u16 = 0x0000;
pub const OPCODE_WAIT: u16 = 0x0001;
pub const OPCODE_JUMP: u16 = 0x0002;
pub const OPCODE_JUMP_IF_FALSE: u16 = 0x004D;
pub const OPCODE_END_THREAD: u16 = 0x004E;
pub const OPCODE_CALL: u16 = 0x0050;
pub const OPCODE_RETURN: u16 = 0x0051;
pub const OPCODE_IF: u16 = 0x00D6;

/// Mask bit the loader mirrors low opcodes under; the engine sets it on
/// an opcode to flip the comparison result.
pub const NEGATED_BIT: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Unconditional,
    Conditional,
    Call,
}

/// Classify an opcode as a control transfer. Matches on the raw value,
/// so a negated variant of a jump opcode is not itself a jump.
pub fn jump_kind(opcode: u16) -> Option<JumpKind> {
    match opcode {
        OPCODE_JUMP => Some(JumpKind::Unconditional),
        OPCODE_JUMP_IF_FALSE => Some(JumpKind::Conditional),
        OPCODE_CALL => Some(JumpKind::Call),
        _ => None,
    }
}

/// The four store opcodes that assign their second operand into the
/// first. Global variable discovery keys off these.
pub fn is_assignment(opcode: u16) -> bool {
    (0x0004..=0x0007).contains(&opcode)
}

/// Decompose an `if` combination sub-code into the number of following
/// conditions and how they combine. Sub-codes 28 and up are invalid.
pub fn condition_combo(sub_code: i32) -> Option<(i32, Combination)> {
    match sub_code {
        0 => Some((1, Combination::None)),
        1..=7 => Some((sub_code + 1, Combination::And)),
        8..=27 => Some((sub_code.wrapping_sub(19), Combination::Or)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    None,
    And,
    Or,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn jump_classification_uses_raw_opcode() {
        assert_eq!(jump_kind(OPCODE_JUMP), Some(JumpKind::Unconditional));
        assert_eq!(jump_kind(OPCODE_JUMP_IF_FALSE), Some(JumpKind::Conditional));
        assert_eq!(jump_kind(OPCODE_CALL), Some(JumpKind::Call));
        assert_eq!(jump_kind(OPCODE_JUMP | NEGATED_BIT), None);
        assert_eq!(jump_kind(OPCODE_WAIT), None);
    }

    #[test]
    fn condition_sub_codes() {
        assert_eq!(condition_combo(0), Some((1, Combination::None)));
        assert_eq!(condition_combo(3), Some((4, Combination::And)));
        assert_eq!(condition_combo(7), Some((8, Combination::And)));
        assert_eq!(condition_combo(8), Some((-11, Combination::Or)));
        assert_eq!(condition_combo(21), Some((2, Combination::Or)));
        assert_eq!(condition_combo(27), Some((8, Combination::Or)));
        assert_eq!(condition_combo(28), None);
        assert_eq!(condition_combo(30), None);
        assert_eq!(condition_combo(-1), None);
    }

    #[test]
    fn assignment_range() {
        assert!(!is_assignment(0x0003));
        assert!(is_assignment(0x0004));
        assert!(is_assignment(0x0007));
        assert!(!is_assignment(0x0008));
    }
}
