//! IR operator definitions.
//!
//! Operators are organized by category:
//! - **Constants**: uniqued integer constants and parameters
//! - **Arithmetic**: floating (pure) integer operations
//! - **Exact arithmetic**: overflow-checked operations, fixed in control flow
//! - **Control**: start, begin, return
//! - **Deoptimization**: frame states and the exits that consume them
//!
//! Each operator knows whether it is *fixed* (has a place in control flow,
//! a predecessor and successors) or *floating* (placed only by its data
//! dependencies), and how many successors a fixed operator has.

use std::fmt;

use super::arith::ArithOp;
use super::constant::Constant;

// =============================================================================
// Operator Categories
// =============================================================================

/// Operator category for fast dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCategory {
    Constant = 0,
    Arithmetic = 1,
    ExactArithmetic = 2,
    Control = 3,
    Deoptimization = 4,
}

// =============================================================================
// Control Operators
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlOp {
    /// Graph entry.
    Start = 0,
    /// Entry of a branch successor.
    Begin = 1,
    /// Function return. Input 0 is the returned value, if any.
    Return = 2,
}

// =============================================================================
// Deoptimization Vocabulary
// =============================================================================

/// Why compiled code gives up and transfers to the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeoptReason {
    /// An exact arithmetic operation overflowed.
    ArithmeticException = 0,
    /// A speculated value range did not hold.
    BoundsCheckException = 1,
    /// Code reached a branch the profile said was never taken.
    UnreachedCode = 2,
    /// Unspecified.
    None = 255,
}

impl DeoptReason {
    pub const fn name(self) -> &'static str {
        match self {
            DeoptReason::ArithmeticException => "arithmetic_exception",
            DeoptReason::BoundsCheckException => "bounds_check_exception",
            DeoptReason::UnreachedCode => "unreached_code",
            DeoptReason::None => "none",
        }
    }
}

/// What the runtime should do with the compiled code after deoptimizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeoptAction {
    /// Keep the code.
    None = 0,
    /// Gather a fresh profile, then recompile.
    Reprofile = 1,
    /// Discard the code and recompile once the profile has updated.
    InvalidateReprofile = 2,
    /// Discard the code and recompile immediately.
    InvalidateRecompile = 3,
    /// Discard the code and never compile this method again.
    InvalidateStopCompiling = 4,
}

impl DeoptAction {
    pub const fn invalidates_code(self) -> bool {
        !matches!(self, DeoptAction::None | DeoptAction::Reprofile)
    }
}

// =============================================================================
// Overflow Condition
// =============================================================================

/// Which overflow directions an exact split has to test for.
///
/// Derived from operand stamp bounds during lowering: adding a non-negative
/// value can only overflow upwards, adding a negative one only downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverflowCondition {
    Positive,
    Negative,
    Both,
}

impl OverflowCondition {
    pub const fn may_overflow_positively(self) -> bool {
        matches!(self, OverflowCondition::Positive | OverflowCondition::Both)
    }

    pub const fn may_overflow_negatively(self) -> bool {
        matches!(self, OverflowCondition::Negative | OverflowCondition::Both)
    }
}

// =============================================================================
// Operator (Unified)
// =============================================================================

/// Unified operator representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Uniqued integer constant.
    Constant(Constant),
    /// Incoming argument. Its stamp is given by the caller.
    Parameter(u16),

    /// Floating wrapping arithmetic (`Neg`, `Add`, `Sub`).
    IntOp(ArithOp),
    /// Fixed overflow-checked arithmetic. Inputs: `[x, y, state_before]`.
    Exact(ArithOp),
    /// Lowered exact arithmetic. Inputs: `[x, y]`; successors:
    /// `[normal, overflow]`.
    ExactSplit(ArithOp, OverflowCondition),

    Control(ControlOp),

    /// Interpreter state at bytecode index `bci`. Inputs are the live locals.
    FrameState(u32),
    /// Exit to the fallback. Input 0 is the frame state to resume from.
    Deoptimize(DeoptReason, DeoptAction),
}

impl Operator {
    pub const fn category(&self) -> OpCategory {
        match self {
            Operator::Constant(_) | Operator::Parameter(_) => OpCategory::Constant,
            Operator::IntOp(_) => OpCategory::Arithmetic,
            Operator::Exact(_) | Operator::ExactSplit(..) => OpCategory::ExactArithmetic,
            Operator::Control(_) => OpCategory::Control,
            Operator::FrameState(_) | Operator::Deoptimize(..) => OpCategory::Deoptimization,
        }
    }

    /// Whether nodes of this kind sit in control flow.
    pub const fn is_fixed(&self) -> bool {
        matches!(
            self,
            Operator::Exact(_)
                | Operator::ExactSplit(..)
                | Operator::Control(_)
                | Operator::Deoptimize(..)
        )
    }

    /// Number of control successors a fixed node of this kind carries.
    pub const fn successor_count(&self) -> usize {
        match self {
            Operator::Control(ControlOp::Start | ControlOp::Begin) | Operator::Exact(_) => 1,
            Operator::ExactSplit(..) => 2,
            _ => 0,
        }
    }

    /// Whether nodes of this kind produce no value.
    pub const fn is_void(&self) -> bool {
        matches!(
            self,
            Operator::Control(_) | Operator::FrameState(_) | Operator::Deoptimize(..)
        )
    }

    /// The arithmetic table entry behind this operator, if any.
    pub const fn arith_op(&self) -> Option<ArithOp> {
        match self {
            Operator::IntOp(op) | Operator::Exact(op) | Operator::ExactSplit(op, _) => Some(*op),
            _ => None,
        }
    }

    pub const fn as_constant(&self) -> Option<Constant> {
        match self {
            Operator::Constant(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Constant(c) => write!(f, "Constant({c:?})"),
            Operator::Parameter(i) => write!(f, "Parameter({i})"),
            Operator::IntOp(op) => write!(f, "{op}"),
            Operator::Exact(op) => write!(f, "{op}"),
            Operator::ExactSplit(op, cond) => write!(f, "{op}_split[{cond:?}]"),
            Operator::Control(op) => write!(f, "{op:?}"),
            Operator::FrameState(bci) => write!(f, "FrameState@{bci}"),
            Operator::Deoptimize(reason, action) => {
                write!(f, "Deoptimize({}, {action:?})", reason.name())
            }
        }
    }
}
