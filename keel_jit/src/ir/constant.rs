//! Integer constants carried by `Constant` nodes.

use std::fmt;

use super::stamp::{IntegerStamp, max_value, min_value};

/// A fixed-width integer constant, stored sign-extended.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constant {
    bits: u32,
    value: i64,
}

impl Constant {
    /// Create a constant of the given width. `value` must already fit.
    pub fn new(bits: u32, value: i64) -> Self {
        assert!(
            (1..=64).contains(&bits) && value >= min_value(bits) && value <= max_value(bits),
            "constant {value} does not fit in {bits} bits"
        );
        Constant { bits, value }
    }

    /// A 32-bit constant.
    #[inline]
    pub fn int(value: i32) -> Self {
        Constant {
            bits: 32,
            value: value as i64,
        }
    }

    /// A 64-bit constant.
    #[inline]
    pub fn long(value: i64) -> Self {
        Constant { bits: 64, value }
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub const fn value(&self) -> i64 {
        self.value
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// The singleton stamp describing this constant.
    pub fn stamp(&self) -> IntegerStamp {
        IntegerStamp::for_constant(self.bits, self.value)
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}i{}", self.value, self.bits)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
