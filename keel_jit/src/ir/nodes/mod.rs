//! Node-kind capabilities.
//!
//! A node kind is an [`Operator`] variant plus whichever of these traits its
//! implementation provides:
//!
//! | capability        | meaning                                              |
//! |-------------------|------------------------------------------------------|
//! | [`StampInferable`]| result stamp follows from input stamps               |
//! | [`Canonicalizable`]| can propose a simpler equivalent node               |
//! | [`Lowerable`]     | is rewritten into lower-level nodes before codegen   |
//! | [`LirLowerable`]  | can emit its own machine operation                   |
//!
//! Capabilities are looked up from the operator (`Operator::as_*`), never
//! from a type hierarchy.

mod add_exact;
mod arithmetic;
mod constant;
mod exact_split;

pub use add_exact::{AddExactNode, add_can_overflow, add_overflow_condition};
pub use arithmetic::{AddNode, NegateNode, SubNode};
pub use constant::ConstantNode;
pub use exact_split::AddExactSplitNode;

use super::arith::ArithOp;
use super::constant::Constant;
use super::graph::Graph;
use super::node::{InputList, NodeId};
use super::operators::Operator;
use super::stamp::Stamp;
use crate::codegen::{ArithmeticLirGenerator, CodegenError, NodeLirBuilder};
use crate::opt::lowering::{LoweringError, LoweringTool};

// =============================================================================
// Canonicalization Contract
// =============================================================================

/// Queries a node may make while computing its canonical form.
pub trait CanonicalizerTool {
    /// Whether every usage of every node is visible, so a node may be
    /// replaced based on how it is used.
    fn all_usages_available(&self) -> bool;
}

/// A node to be created by the canonicalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTemplate {
    pub op: Operator,
    pub inputs: InputList,
}

impl NodeTemplate {
    pub fn new(op: Operator, inputs: &[NodeId]) -> Self {
        NodeTemplate {
            op,
            inputs: InputList::from_slice(inputs),
        }
    }
}

/// Result of asking a node for its canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Canonical {
    /// The node is already canonical.
    Unchanged,
    /// An existing node computes the same value.
    Existing(NodeId),
    /// The node always evaluates to this constant.
    Constant(Constant),
    /// A new node computes the same value more simply.
    New(NodeTemplate),
}

// =============================================================================
// Capabilities
// =============================================================================

pub trait StampInferable {
    /// The result stamp given the stamps of the node's inputs, in order.
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp;
}

pub trait Canonicalizable {
    /// The canonical form of `node` given its current inputs.
    ///
    /// Must not mutate the graph; the canonicalizer applies the result.
    fn canonical(&self, tool: &dyn CanonicalizerTool, graph: &Graph, node: NodeId) -> Canonical;
}

pub trait Lowerable {
    /// Fail if `node` cannot be lowered. Runs for every node before any is
    /// lowered.
    fn check(&self, _graph: &Graph, _node: NodeId) -> Result<(), LoweringError> {
        Ok(())
    }

    fn lower(&self, tool: &mut LoweringTool<'_>, node: NodeId) -> Result<(), LoweringError>;
}

pub trait LirLowerable {
    /// Emit the machine operation for `node`, whose operands are already
    /// materialized in `builder`, and record its result there.
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError>;
}

impl Operator {
    pub fn as_stamp_inferable(&self) -> Option<&'static dyn StampInferable> {
        match self {
            Operator::IntOp(ArithOp::Neg) => Some(&NegateNode),
            Operator::IntOp(ArithOp::Add) => Some(&AddNode),
            Operator::IntOp(ArithOp::Sub) => Some(&SubNode),
            Operator::Exact(ArithOp::AddExact) => Some(&AddExactNode),
            Operator::ExactSplit(ArithOp::AddExact, _) => Some(&AddExactSplitNode),
            _ => None,
        }
    }

    pub fn as_canonicalizable(&self) -> Option<&'static dyn Canonicalizable> {
        match self {
            Operator::IntOp(ArithOp::Neg) => Some(&NegateNode),
            Operator::IntOp(ArithOp::Add) => Some(&AddNode),
            Operator::IntOp(ArithOp::Sub) => Some(&SubNode),
            Operator::Exact(ArithOp::AddExact) => Some(&AddExactNode),
            _ => None,
        }
    }

    pub fn as_lowerable(&self) -> Option<&'static dyn Lowerable> {
        match self {
            Operator::Exact(ArithOp::AddExact) => Some(&AddExactNode),
            _ => None,
        }
    }

    pub fn as_lir_lowerable(&self) -> Option<&'static dyn LirLowerable> {
        match self {
            Operator::Constant(_) => Some(&ConstantNode),
            Operator::IntOp(ArithOp::Neg) => Some(&NegateNode),
            Operator::IntOp(ArithOp::Add) => Some(&AddNode),
            Operator::IntOp(ArithOp::Sub) => Some(&SubNode),
            Operator::ExactSplit(ArithOp::AddExact, _) => Some(&AddExactSplitNode),
            _ => None,
        }
    }
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Fold the integer stamps of the leading `op.arity()` inputs.
fn fold_input_stamps(op: ArithOp, inputs: &[Stamp]) -> Stamp {
    let operands: smallvec::SmallVec<[_; 2]> = inputs[..op.arity()]
        .iter()
        .map(|s| *s.expect_integer())
        .collect();
    Stamp::Integer(op.fold_stamp(&operands))
}

/// Input `index` of `node`, which the node kind guarantees to exist.
fn operand(graph: &Graph, node: NodeId, index: usize) -> NodeId {
    graph.node(node).inputs()[index]
}

fn constant_of(graph: &Graph, id: NodeId) -> Option<Constant> {
    graph.node(id).as_constant()
}
