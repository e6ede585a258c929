//! The integer arithmetic operation table.
//!
//! Each [`ArithOp`] is a stateless descriptor shared by every node of that
//! kind. It knows how to fold operand stamps into a result stamp and operand
//! constants into a result constant. Folding a stamp is always sound: every
//! concrete result of the operation on values described by the operand
//! stamps is described by the folded stamp.
//!
//! Wrapping operations (`Add`, `Sub`, `Neg`) fold constants modulo 2^bits.
//! Exact operations fail to fold with [`ArithmeticOverflow`] instead of
//! wrapping, so that the overflow check survives to lowering.

use std::fmt;

use thiserror::Error;

use super::constant::Constant;
use super::stamp::{
    IntegerStamp, add_overflows_negatively, add_overflows_positively, carry_bits, mask, max_value,
    min_value, sign_extend,
};

// =============================================================================
// Operation Table
// =============================================================================

/// Integer arithmetic operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArithOp {
    // Binary operations
    /// Wrapping addition: a + b mod 2^bits
    Add = 0,
    /// Wrapping subtraction: a - b mod 2^bits
    Sub = 1,
    /// Overflow-checked addition.
    AddExact = 2,

    // Unary operations
    /// Wrapping negation: -a mod 2^bits
    Neg = 16,
}

/// Folding an exact operation on constants overflowed its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{op} of {lhs} and {rhs} overflows {bits} bits")]
pub struct ArithmeticOverflow {
    pub op: ArithOp,
    pub bits: u32,
    pub lhs: i64,
    pub rhs: i64,
}

impl ArithOp {
    #[inline]
    pub const fn is_commutative(self) -> bool {
        matches!(self, ArithOp::Add | ArithOp::AddExact)
    }

    #[inline]
    pub const fn is_unary(self) -> bool {
        (self as u8) >= 16
    }

    #[inline]
    pub const fn arity(self) -> usize {
        if self.is_unary() { 1 } else { 2 }
    }

    /// Whether the operation traps instead of wrapping.
    #[inline]
    pub const fn is_exact(self) -> bool {
        matches!(self, ArithOp::AddExact)
    }

    /// The identity element on the right-hand side, if any.
    pub const fn right_identity(self) -> Option<i64> {
        match self {
            ArithOp::Add | ArithOp::Sub | ArithOp::AddExact => Some(0),
            ArithOp::Neg => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::AddExact => "add_exact",
            ArithOp::Neg => "neg",
        }
    }

    /// Fold operand stamps into the stamp of the result.
    ///
    /// Panics if the operand count or widths are inconsistent: that means
    /// the graph was built wrong.
    pub fn fold_stamp(self, operands: &[IntegerStamp]) -> IntegerStamp {
        self.check_operands(operands.iter().map(|s| s.bits()), operands.len());
        match self {
            ArithOp::Neg => fold_neg(&operands[0]),
            ArithOp::Add => fold_add(&operands[0], &operands[1]),
            ArithOp::Sub => fold_add(&operands[0], &fold_neg(&operands[1])),
            ArithOp::AddExact => fold_add_exact(&operands[0], &operands[1]),
        }
    }

    /// Fold operand constants. Only exact operations can fail.
    pub fn fold_constant(self, operands: &[Constant]) -> Result<Constant, ArithmeticOverflow> {
        self.check_operands(operands.iter().map(|c| c.bits()), operands.len());
        let bits = operands[0].bits();
        let wrap = |value: i64| Constant::new(bits, sign_extend(value as u64 & mask(bits), bits));
        match self {
            ArithOp::Neg => Ok(wrap(operands[0].value().wrapping_neg())),
            ArithOp::Add => Ok(wrap(operands[0].value().wrapping_add(operands[1].value()))),
            ArithOp::Sub => Ok(wrap(operands[0].value().wrapping_sub(operands[1].value()))),
            ArithOp::AddExact => {
                let (lhs, rhs) = (operands[0].value(), operands[1].value());
                checked_add(lhs, rhs, bits)
                    .map(|sum| Constant::new(bits, sum))
                    .ok_or(ArithmeticOverflow {
                        op: self,
                        bits,
                        lhs,
                        rhs,
                    })
            }
        }
    }

    fn check_operands(self, mut widths: impl Iterator<Item = u32>, count: usize) {
        assert_eq!(count, self.arity(), "{} expects {} operands", self.name(), self.arity());
        if let Some(first) = widths.next() {
            for bits in widths {
                assert_eq!(first, bits, "{} operands have different widths", self.name());
            }
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `lhs + rhs` if it fits in `bits`.
pub fn checked_add(lhs: i64, rhs: i64, bits: u32) -> Option<i64> {
    let sum = lhs.checked_add(rhs)?;
    (sum >= min_value(bits) && sum <= max_value(bits)).then_some(sum)
}

// =============================================================================
// Stamp Folding
// =============================================================================

fn fold_neg(stamp: &IntegerStamp) -> IntegerStamp {
    let bits = stamp.bits();
    if stamp.lower_bound() != min_value(bits) {
        return IntegerStamp::for_bounds(bits, -stamp.upper_bound(), -stamp.lower_bound());
    }
    // -MIN wraps to MIN.
    if stamp.upper_bound() == min_value(bits) {
        IntegerStamp::for_constant(bits, min_value(bits))
    } else {
        IntegerStamp::unrestricted(bits)
    }
}

/// Known-bit masks of `a + b` (with or without wrapping, the low `bits`
/// are the same).
fn add_masks(a: &IntegerStamp, b: &IntegerStamp) -> (u64, u64) {
    let width = mask(a.bits());
    let variable = (a.down_mask() ^ a.up_mask()) | (b.down_mask() ^ b.up_mask());
    let variable_with_carry = variable
        | (carry_bits(a.down_mask(), b.down_mask()) ^ carry_bits(a.up_mask(), b.up_mask()));
    let sum = a.down_mask().wrapping_add(b.down_mask());
    (
        (sum & !variable_with_carry) & width,
        (sum | variable_with_carry) & width,
    )
}

fn wrapping_sum(x: i64, y: i64, bits: u32) -> i64 {
    sign_extend(x.wrapping_add(y) as u64 & mask(bits), bits)
}

fn fold_add(a: &IntegerStamp, b: &IntegerStamp) -> IntegerStamp {
    let bits = a.bits();
    let (down, up) = add_masks(a, b);

    let low_pos = add_overflows_positively(a.lower_bound(), b.lower_bound(), bits);
    let high_pos = add_overflows_positively(a.upper_bound(), b.upper_bound(), bits);
    let low_neg = add_overflows_negatively(a.lower_bound(), b.lower_bound(), bits);
    let high_neg = add_overflows_negatively(a.upper_bound(), b.upper_bound(), bits);

    // Both extreme sums in the same wrap band: the wrapped range stays
    // contiguous. Otherwise it covers the whole width.
    let (lower, upper) = if low_pos == high_pos && low_neg == high_neg {
        (
            wrapping_sum(a.lower_bound(), b.lower_bound(), bits),
            wrapping_sum(a.upper_bound(), b.upper_bound(), bits),
        )
    } else {
        (min_value(bits), max_value(bits))
    };

    IntegerStamp::tightened(bits, lower, upper, down, up)
        .unwrap_or_else(|| IntegerStamp::for_bounds(bits, lower, upper))
}

fn fold_add_exact(a: &IntegerStamp, b: &IntegerStamp) -> IntegerStamp {
    let bits = a.bits();
    let (down, up) = add_masks(a, b);

    let clamp = |x: i64, y: i64| {
        if add_overflows_positively(x, y, bits) {
            max_value(bits)
        } else if add_overflows_negatively(x, y, bits) {
            min_value(bits)
        } else {
            wrapping_sum(x, y, bits)
        }
    };
    let lower = clamp(a.lower_bound(), b.lower_bound());
    let upper = clamp(a.upper_bound(), b.upper_bound());

    // Every non-trapping result satisfies both the clamped bounds and the
    // masks. If they contradict each other the add always traps; keep the
    // bound-only stamp.
    IntegerStamp::tightened(bits, lower, upper, down, up)
        .unwrap_or_else(|| IntegerStamp::for_bounds(bits, lower, upper))
}

// =============================================================================
// Tests
// =============================================================================
