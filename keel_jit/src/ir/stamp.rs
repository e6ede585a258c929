//! Stamps: abstract descriptors of the values a node may produce.
//!
//! An [`IntegerStamp`] describes a set of `bits`-wide two's-complement integers
//! by two independent constraints:
//!
//! - **Bounds**: `lower_bound <= v <= upper_bound` (signed, sign-extended to i64)
//! - **Masks**: every bit in `down_mask` is set in `v`, no bit outside
//!   `up_mask` is set in `v` (zero-extended to the stamp width)
//!
//! The represented set is the intersection of both. Stamps are ordered by
//! inclusion of that set; [`IntegerStamp::meet`] is the union and
//! [`IntegerStamp::join`] the intersection.
//!
//! ```text
//!              unrestricted(bits)
//!             /        |        \
//!        [0, 10]   [-5, 5]   <down=1|up=0xff>
//!             \        |        /
//!               constant  (lower == upper)
//! ```
//!
//! Re-inference may only narrow a node's stamp; see [`IntegerStamp::fits_in`].

use std::fmt;

use thiserror::Error;

// =============================================================================
// Width Helpers
// =============================================================================

/// All-ones mask of the given width.
#[inline]
pub const fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Smallest signed value of the given width.
#[inline]
pub const fn min_value(bits: u32) -> i64 {
    if bits >= 64 {
        i64::MIN
    } else {
        -(1i64 << (bits - 1))
    }
}

/// Largest signed value of the given width.
#[inline]
pub const fn max_value(bits: u32) -> i64 {
    if bits >= 64 {
        i64::MAX
    } else {
        (1i64 << (bits - 1)) - 1
    }
}

/// Interpret the low `bits` of `value` as a signed number.
#[inline]
pub const fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits >= 64 {
        value as i64
    } else {
        let shift = 64 - bits;
        ((value << shift) as i64) >> shift
    }
}

/// The low `bits` of `value`, as an unsigned pattern.
#[inline]
pub const fn zero_extend(value: i64, bits: u32) -> u64 {
    value as u64 & mask(bits)
}

/// Bit positions that receive an incoming carry when adding `x + y`.
#[inline]
pub const fn carry_bits(x: u64, y: u64) -> u64 {
    x.wrapping_add(y) ^ x ^ y
}

/// Whether `x + y` exceeds the largest `bits`-wide value.
#[inline]
pub const fn add_overflows_positively(x: i64, y: i64, bits: u32) -> bool {
    if bits >= 64 {
        (!x & !y & x.wrapping_add(y)) < 0
    } else {
        x + y > max_value(bits)
    }
}

/// Whether `x + y` falls below the smallest `bits`-wide value.
#[inline]
pub const fn add_overflows_negatively(x: i64, y: i64, bits: u32) -> bool {
    if bits >= 64 {
        (x & y & !x.wrapping_add(y)) < 0
    } else {
        x + y < min_value(bits)
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Reasons a stamp cannot be constructed or applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StampError {
    #[error("unsupported integer width {0}")]
    InvalidWidth(u32),
    #[error("bound {value} does not fit in {bits} bits")]
    BoundOutOfRange { bits: u32, value: i64 },
    #[error("empty range [{lower}, {upper}]")]
    EmptyRange { lower: i64, upper: i64 },
    #[error("mask {mask:#x} has bits outside the {bits}-bit width")]
    MaskOutOfRange { bits: u32, mask: u64 },
    #[error("down mask {down:#x} is not a subset of up mask {up:#x}")]
    DownMaskNotSubset { down: u64, up: u64 },
    #[error("masks <{down:#x}|{up:#x}> admit no value in [{lower}, {upper}]")]
    MasksContradictBounds {
        lower: i64,
        upper: i64,
        down: u64,
        up: u64,
    },
    #[error("operand widths differ: {0} vs {1}")]
    WidthMismatch(u32, u32),
    #[error("stamp {new} is wider than current stamp {current}")]
    Widening { current: String, new: String },
    #[error("expected an integer stamp, found {0}")]
    NotInteger(String),
}

// =============================================================================
// Integer Stamp
// =============================================================================

/// Immutable range + known-bits descriptor for a fixed-width integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerStamp {
    bits: u32,
    lower_bound: i64,
    upper_bound: i64,
    down_mask: u64,
    up_mask: u64,
}

impl IntegerStamp {
    /// Create a stamp, treating any inconsistency as a fatal compiler defect.
    pub fn new(bits: u32, lower_bound: i64, upper_bound: i64, down_mask: u64, up_mask: u64) -> Self {
        match Self::try_new(bits, lower_bound, upper_bound, down_mask, up_mask) {
            Ok(stamp) => stamp,
            Err(err) => panic!("inconsistent integer stamp: {err}"),
        }
    }

    /// Create a stamp, validating every invariant.
    pub fn try_new(
        bits: u32,
        lower_bound: i64,
        upper_bound: i64,
        down_mask: u64,
        up_mask: u64,
    ) -> Result<Self, StampError> {
        if bits == 0 || bits > 64 {
            return Err(StampError::InvalidWidth(bits));
        }
        for value in [lower_bound, upper_bound] {
            if value < min_value(bits) || value > max_value(bits) {
                return Err(StampError::BoundOutOfRange { bits, value });
            }
        }
        if lower_bound > upper_bound {
            return Err(StampError::EmptyRange {
                lower: lower_bound,
                upper: upper_bound,
            });
        }
        for m in [down_mask, up_mask] {
            if m & !mask(bits) != 0 {
                return Err(StampError::MaskOutOfRange { bits, mask: m });
            }
        }
        if down_mask & up_mask != down_mask {
            return Err(StampError::DownMaskNotSubset {
                down: down_mask,
                up: up_mask,
            });
        }
        if mask_min(bits, down_mask, up_mask) > upper_bound
            || mask_max(bits, down_mask, up_mask) < lower_bound
        {
            return Err(StampError::MasksContradictBounds {
                lower: lower_bound,
                upper: upper_bound,
                down: down_mask,
                up: up_mask,
            });
        }
        Ok(IntegerStamp {
            bits,
            lower_bound,
            upper_bound,
            down_mask,
            up_mask,
        })
    }

    /// The full `bits`-wide range with no known bits.
    pub fn unrestricted(bits: u32) -> Self {
        Self::new(bits, min_value(bits), max_value(bits), 0, mask(bits))
    }

    /// The singleton stamp for `value`.
    pub fn for_constant(bits: u32, value: i64) -> Self {
        let pattern = zero_extend(value, bits);
        Self::new(bits, value, value, pattern, pattern)
    }

    /// The stamp for `[lower, upper]`, with the masks implied by the range.
    ///
    /// When both bounds have the same sign every value in between shares the
    /// bits above the highest bit in which the bounds differ; those bits are
    /// known. A range straddling zero has no known bits.
    pub fn for_bounds(bits: u32, lower: i64, upper: i64) -> Self {
        let (down, up) = bound_masks(bits, lower, upper);
        Self::new(bits, lower, upper, down, up)
    }

    /// Combine a range with known bits, letting each constraint tighten the
    /// other. Returns `None` if no value satisfies both.
    ///
    /// The up mask and upper bound are tightened first, then the down mask and
    /// lower bound.
    pub fn tightened(bits: u32, lower: i64, upper: i64, down: u64, up: u64) -> Option<Self> {
        if lower > upper {
            return None;
        }
        let (limit_down, limit_up) = bound_masks(bits, lower, upper);

        let up = up & limit_up;
        let down = down | limit_down;
        if down & !up != 0 {
            return None;
        }
        let upper = upper.min(mask_max(bits, down, up));
        let lower = lower.max(mask_min(bits, down, up));
        if lower > upper {
            return None;
        }
        Self::try_new(bits, lower, upper, down, up).ok()
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub const fn lower_bound(&self) -> i64 {
        self.lower_bound
    }

    #[inline]
    pub const fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    /// Bits set in every represented value.
    #[inline]
    pub const fn down_mask(&self) -> u64 {
        self.down_mask
    }

    /// Bits set in at least one represented value.
    #[inline]
    pub const fn up_mask(&self) -> u64 {
        self.up_mask
    }

    pub fn is_unrestricted(&self) -> bool {
        self.lower_bound == min_value(self.bits)
            && self.upper_bound == max_value(self.bits)
            && self.down_mask == 0
            && self.up_mask == mask(self.bits)
    }

    /// The single represented value, if there is exactly one.
    pub fn as_constant(&self) -> Option<i64> {
        (self.lower_bound == self.upper_bound).then_some(self.lower_bound)
    }

    pub fn is_strictly_positive(&self) -> bool {
        self.lower_bound > 0
    }

    pub fn is_positive(&self) -> bool {
        self.lower_bound >= 0
    }

    pub fn is_strictly_negative(&self) -> bool {
        self.upper_bound < 0
    }

    /// Whether the concrete `bits`-wide value `value` is represented.
    pub fn contains(&self, value: i64) -> bool {
        if value < self.lower_bound || value > self.upper_bound {
            return false;
        }
        let pattern = zero_extend(value, self.bits);
        pattern & self.down_mask == self.down_mask && pattern & !self.up_mask == 0
    }

    /// Whether every value `self` describes is also described by `other`,
    /// judged constraint by constraint.
    pub fn fits_in(&self, other: &IntegerStamp) -> bool {
        self.bits == other.bits
            && self.lower_bound >= other.lower_bound
            && self.upper_bound <= other.upper_bound
            && self.down_mask & other.down_mask == other.down_mask
            && self.up_mask & !other.up_mask == 0
    }

    /// Least stamp describing the union of both value sets.
    pub fn meet(&self, other: &IntegerStamp) -> IntegerStamp {
        assert_eq!(self.bits, other.bits, "meet of stamps with different widths");
        IntegerStamp::new(
            self.bits,
            self.lower_bound.min(other.lower_bound),
            self.upper_bound.max(other.upper_bound),
            self.down_mask & other.down_mask,
            self.up_mask | other.up_mask,
        )
    }

    /// Stamp describing the intersection of both value sets, or `None` if it
    /// is empty.
    pub fn join(&self, other: &IntegerStamp) -> Option<IntegerStamp> {
        assert_eq!(self.bits, other.bits, "join of stamps with different widths");
        Self::tightened(
            self.bits,
            self.lower_bound.max(other.lower_bound),
            self.upper_bound.min(other.upper_bound),
            self.down_mask | other.down_mask,
            self.up_mask & other.up_mask,
        )
    }
}

impl fmt::Debug for IntegerStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "i{} [{} - {}] <{:#x}|{:#x}>",
            self.bits, self.lower_bound, self.upper_bound, self.down_mask, self.up_mask
        )
    }
}

impl fmt::Display for IntegerStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Smallest signed value consistent with the masks alone.
fn mask_min(bits: u32, down: u64, up: u64) -> i64 {
    let sign = 1u64 << (bits - 1);
    if up & sign != 0 && down & sign == 0 {
        sign_extend(down | sign, bits)
    } else {
        sign_extend(down, bits)
    }
}

/// Largest signed value consistent with the masks alone.
fn mask_max(bits: u32, down: u64, up: u64) -> i64 {
    let sign = 1u64 << (bits - 1);
    if up & sign != 0 && down & sign == 0 {
        sign_extend(up & !sign, bits)
    } else {
        sign_extend(up, bits)
    }
}

/// Known-bit masks implied by a signed range.
fn bound_masks(bits: u32, lower: i64, upper: i64) -> (u64, u64) {
    let width = mask(bits);
    if lower == upper {
        let pattern = zero_extend(lower, bits);
        return (pattern, pattern);
    }
    if (lower < 0) != (upper < 0) {
        return (0, width);
    }
    let differing = (lower ^ upper) as u64;
    let variable = u64::MAX >> differing.leading_zeros();
    let prefix = lower as u64;
    ((prefix & !variable) & width, (prefix | variable) & width)
}

// =============================================================================
// Stamp
// =============================================================================

/// The stamp carried by every node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stamp {
    /// A fixed-width integer value.
    Integer(IntegerStamp),
    /// No value: control, frame-state and deoptimization nodes.
    Void,
}

impl Stamp {
    pub fn int(bits: u32) -> Self {
        Stamp::Integer(IntegerStamp::unrestricted(bits))
    }

    pub fn as_integer(&self) -> Option<&IntegerStamp> {
        match self {
            Stamp::Integer(stamp) => Some(stamp),
            Stamp::Void => None,
        }
    }

    /// The integer stamp of a value node. A non-integer here means the graph
    /// was built with incompatible operand kinds.
    pub fn expect_integer(&self) -> &IntegerStamp {
        match self {
            Stamp::Integer(stamp) => stamp,
            Stamp::Void => panic!("value of void kind used as an integer operand"),
        }
    }

    /// Whether values of both stamps could flow into the same operand slot.
    pub fn is_compatible(&self, other: &Stamp) -> bool {
        match (self, other) {
            (Stamp::Integer(a), Stamp::Integer(b)) => a.bits() == b.bits(),
            (Stamp::Void, Stamp::Void) => true,
            _ => false,
        }
    }

    /// Whether `self` is at least as precise as `other`.
    pub fn fits_in(&self, other: &Stamp) -> bool {
        match (self, other) {
            (Stamp::Integer(a), Stamp::Integer(b)) => a.fits_in(b),
            (Stamp::Void, Stamp::Void) => true,
            _ => false,
        }
    }

    /// Intersection, or `None` if the stamps are incompatible or disjoint.
    pub fn join(&self, other: &Stamp) -> Option<Stamp> {
        match (self, other) {
            (Stamp::Integer(a), Stamp::Integer(b)) if a.bits() == b.bits() => {
                a.join(b).map(Stamp::Integer)
            }
            (Stamp::Void, Stamp::Void) => Some(Stamp::Void),
            _ => None,
        }
    }
}

impl fmt::Debug for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::Integer(stamp) => write!(f, "{stamp:?}"),
            Stamp::Void => write!(f, "void"),
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Tests
// =============================================================================
