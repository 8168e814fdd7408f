use std::cmp::Ordering;

use crate::error::CpuError;
use crate::opcode::Opcode;

/// Condition flags. Exactly one is set after `CMP`; none before the first comparison.
pub const FL_EQUAL: u8 = 0b001;
pub const FL_GREATER: u8 = 0b010;
pub const FL_LESS: u8 = 0b100;

/// Where an ALU result must be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOutput {
    /// New value for the destination register.
    Register(u8),
    /// New value for FL.
    Flags(u8),
}

/// Compute `op` over two register values.
///
/// Unary operations ignore `b`. Results wrap to 8 bits.
pub fn execute(op: Opcode, a: u8, b: u8) -> Result<AluOutput, CpuError> {
    use AluOutput::Register;
    let out = match op {
        Opcode::ADD => Register(a.wrapping_add(b)),
        Opcode::SUB => Register(a.wrapping_sub(b)),
        Opcode::MUL => Register(a.wrapping_mul(b)),
        Opcode::DIV => Register(a.checked_div(b).ok_or(CpuError::DivisionByZero)?),
        Opcode::MOD => Register(a.checked_rem(b).ok_or(CpuError::DivisionByZero)?),
        Opcode::AND => Register(a & b),
        Opcode::OR => Register(a | b),
        Opcode::XOR => Register(a ^ b),
        Opcode::SHL => Register(shift(a, b, u32::checked_shl)),
        Opcode::SHR => Register(shift(a, b, u32::checked_shr)),
        Opcode::INC => Register(a.wrapping_add(1)),
        Opcode::DEC => Register(a.wrapping_sub(1)),
        Opcode::NOT => Register(!a),
        Opcode::CMP => AluOutput::Flags(compare(a, b)),
        _ => return Err(CpuError::UnsupportedOperation(op.mnemonic())),
    };
    Ok(out)
}

/// Flag pattern for an unsigned comparison of `a` against `b`.
pub fn compare(a: u8, b: u8) -> u8 {
    match a.cmp(&b) {
        Ordering::Equal => FL_EQUAL,
        Ordering::Greater => FL_GREATER,
        Ordering::Less => FL_LESS,
    }
}

// Shift amounts of 8 and above clear the register
fn shift(a: u8, b: u8, f: fn(u32, u32) -> Option<u32>) -> u8 {
    (f(a as u32, b as u32).unwrap_or(0) & 0xFF) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use AluOutput::*;

    #[test]
    fn wraps_to_eight_bits() {
        // Sample the operand space rather than every pair
        let samples = [0u8, 1, 2, 7, 8, 9, 15, 16, 100, 127, 128, 200, 254, 255];
        for &a in &samples {
            for &b in &samples {
                let (wa, wb) = (a as u32, b as u32);
                let cases = [
                    (Opcode::ADD, (wa + wb) % 256),
                    (Opcode::SUB, (wa + 256 - wb) % 256),
                    (Opcode::MUL, (wa * wb) % 256),
                    (Opcode::INC, (wa + 1) % 256),
                    (Opcode::DEC, (wa + 255) % 256),
                    (Opcode::SHL, if wb < 32 { (wa << wb) % 256 } else { 0 }),
                    (Opcode::SHR, if wb < 32 { (wa >> wb) % 256 } else { 0 }),
                ];
                for (op, expected) in cases {
                    assert_eq!(
                        execute(op, a, b),
                        Ok(Register(expected as u8)),
                        "{op} {a} {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn integer_division() {
        assert_eq!(execute(Opcode::DIV, 7, 2), Ok(Register(3)));
        assert_eq!(execute(Opcode::DIV, 255, 16), Ok(Register(15)));
        assert_eq!(execute(Opcode::MOD, 7, 2), Ok(Register(1)));
        assert_eq!(execute(Opcode::MOD, 3, 200), Ok(Register(3)));
        assert_eq!(execute(Opcode::DIV, 5, 0), Err(CpuError::DivisionByZero));
        assert_eq!(execute(Opcode::MOD, 5, 0), Err(CpuError::DivisionByZero));
    }

    #[test]
    fn bitwise() {
        assert_eq!(execute(Opcode::AND, 0b1100, 0b1010), Ok(Register(0b1000)));
        assert_eq!(execute(Opcode::OR, 0b1100, 0b1010), Ok(Register(0b1110)));
        assert_eq!(execute(Opcode::XOR, 0b1100, 0b1010), Ok(Register(0b0110)));
        assert_eq!(execute(Opcode::NOT, 0, 99), Ok(Register(255)));
        assert_eq!(execute(Opcode::NOT, 0b1010_1010, 0), Ok(Register(0b0101_0101)));
        for a in 0..=u8::MAX {
            assert_eq!(execute(Opcode::NOT, a, 0), Ok(Register(255 - a)));
        }
    }

    #[test]
    fn compare_sets_exactly_one_flag() {
        for a in (0..=u8::MAX).step_by(5) {
            for b in (0..=u8::MAX).step_by(3) {
                let Ok(Flags(fl)) = execute(Opcode::CMP, a, b) else {
                    panic!("CMP must write flags");
                };
                assert_eq!(fl.count_ones(), 1);
                let expected = if a == b {
                    FL_EQUAL
                } else if a > b {
                    FL_GREATER
                } else {
                    FL_LESS
                };
                assert_eq!(fl, expected, "CMP {a} {b}");
            }
        }
    }

    #[test]
    fn rejects_non_alu() {
        assert_eq!(
            execute(Opcode::PUSH, 1, 2),
            Err(CpuError::UnsupportedOperation("PUSH"))
        );
    }
}
