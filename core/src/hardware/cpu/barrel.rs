//! The barrel shifter: every data-processing and single-data-transfer operand can be shifted for
//! free alongside the ALU operation. Returns `(result, shifter_carry_out)`.

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => ShiftKind::Lsl,
            1 => ShiftKind::Lsr,
            2 => ShiftKind::Asr,
            3 => ShiftKind::Ror,
            _ => unreachable!(),
        }
    }
}

/// `amount == 0` has special immediate-form meanings for LSR/ASR/ROR (encoded as shift-by-32,
/// shift-by-32, and rotate-right-through-carry respectively); `register_form` selects that.
pub fn shift(kind: ShiftKind, value: u32, amount: u32, carry_in: bool, register_form: bool) -> (u32, bool) {
    match kind {
        ShiftKind::Lsl => {
            if amount == 0 {
                (value, carry_in)
            } else if amount < 32 {
                (value << amount, value & (1 << (32 - amount)) != 0)
            } else if amount == 32 {
                (0, value & 1 != 0)
            } else {
                (0, false)
            }
        }
        ShiftKind::Lsr => {
            let effective = if amount == 0 && !register_form { 32 } else { amount };
            if effective == 0 {
                (value, carry_in)
            } else if effective < 32 {
                (value >> effective, value & (1 << (effective - 1)) != 0)
            } else if effective == 32 {
                (0, value & (1 << 31) != 0)
            } else {
                (0, false)
            }
        }
        ShiftKind::Asr => {
            let effective = if amount == 0 && !register_form { 32 } else { amount };
            if effective == 0 {
                (value, carry_in)
            } else if effective < 32 {
                ((value as i32 >> effective) as u32, value & (1 << (effective - 1)) != 0)
            } else {
                let filled = if value & (1 << 31) != 0 { u32::MAX } else { 0 };
                (filled, value & (1 << 31) != 0)
            }
        }
        ShiftKind::Ror => {
            if amount == 0 && !register_form {
                // RRX: rotate right by one through carry.
                let result = (value >> 1) | ((carry_in as u32) << 31);
                (result, value & 1 != 0)
            } else {
                let amount = amount % 32;
                if amount == 0 {
                    (value, value & (1 << 31) != 0)
                } else {
                    (value.rotate_right(amount), value & (1 << (amount - 1)) != 0)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsl_by_32_zeroes_and_takes_carry_from_bit0() {
        let (result, carry) = shift(ShiftKind::Lsl, 0b1, 32, false, true);
        assert_eq!(result, 0);
        assert!(carry);
    }

    #[test]
    fn rrx_rotates_through_carry_in() {
        let (result, carry) = shift(ShiftKind::Ror, 0b10, 0, true, false);
        assert_eq!(result, 0x8000_0001);
        assert!(!carry);
    }

    #[test]
    fn asr_by_32_or_more_sign_extends() {
        let (result, carry) = shift(ShiftKind::Asr, 0x8000_0000, 40, false, true);
        assert_eq!(result, 0xFFFF_FFFF);
        assert!(carry);
    }
}
