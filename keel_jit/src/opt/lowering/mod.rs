//! Exact-arithmetic lowering.
//!
//! Turns every remaining exact arithmetic node into explicit control flow:
//!
//! ```text
//!   pred                         pred
//!    |                            |
//!  AddExact(x, y, fs)    =>   AddExactSplit(x, y)
//!    |                        /            \
//!   next                   Begin          Begin
//!                            |              |
//!                           next      Deoptimize(fs)
//! ```
//!
//! The normal successor continues with the sum; the overflow successor
//! deoptimizes to the node's frame state. If operand stamps prove the add
//! cannot overflow, the node becomes a plain wrapping add instead.
//!
//! Lowering reads stamps as the canonicalizer left them, so it only runs on
//! a graph at its canonical fixpoint and marks the graph lowered afterwards.

mod deopt;

pub use deopt::{DeoptimizeNodeFactory, DeoptimizationService};

use thiserror::Error;

use super::OptimizationPass;
use crate::error::CompileResult;
use crate::ir::arith::ArithOp;
use crate::ir::graph::{Graph, GraphId, GraphStage};
use crate::ir::node::NodeId;
use crate::ir::operators::{ControlOp, DeoptAction, DeoptReason, Operator, OverflowCondition};
use crate::ir::stamp::{Stamp, StampError};

// =============================================================================
// Errors & Statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("graph {0} is not at its canonical fixpoint")]
    NotCanonical(GraphId),
    #[error("graph {0} has already been lowered")]
    AlreadyLowered(GraphId),
    #[error("{0} has no frame state to deoptimize to")]
    MissingFrameState(NodeId),
    #[error("{0} has no successor")]
    MissingNext(NodeId),
    #[error(transparent)]
    Stamp(#[from] StampError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoweringStats {
    /// Exact nodes split into a fast path and a deoptimization path.
    pub split: usize,
    /// Exact nodes proven overflow-free and replaced by wrapping arithmetic.
    pub overflow_free: usize,
}

impl LoweringStats {
    pub fn changed(&self) -> bool {
        self.split + self.overflow_free > 0
    }
}

// =============================================================================
// Lowering Tool
// =============================================================================

/// What a [`Lowerable`](crate::ir::nodes::Lowerable) node gets to work with.
pub struct LoweringTool<'a> {
    graph: &'a mut Graph,
    deopt: &'a dyn DeoptimizationService,
    stats: LoweringStats,
}

impl<'a> LoweringTool<'a> {
    pub fn new(graph: &'a mut Graph, deopt: &'a dyn DeoptimizationService) -> Self {
        LoweringTool {
            graph,
            deopt,
            stats: LoweringStats::default(),
        }
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.graph
    }

    pub fn stats(&self) -> LoweringStats {
        self.stats
    }

    /// Replace the exact node `node` by the wrapping operation `op` over the
    /// same operands. Only valid when the operation cannot overflow.
    pub fn replace_with_wrapping(&mut self, node: NodeId, op: ArithOp) -> Result<(), LoweringError> {
        let graph = &mut *self.graph;
        let operands: Vec<NodeId> = graph.node(node).inputs()[..op.arity()].to_vec();
        let wrapping = graph.add_inferred(Operator::IntOp(op), &operands);

        // No overflow means the exact stamp describes the wrapped value too.
        if let Some(joined) = graph.stamp(wrapping).join(graph.stamp(node)) {
            graph.narrow_stamp(wrapping, joined)?;
        }

        graph.replace_fixed_with_floating(node, wrapping);
        self.stats.overflow_free += 1;
        log::trace!("{node}: cannot overflow, lowered to {op} {wrapping}");
        Ok(())
    }

    /// Split the exact node `node` into a two-way branch on overflow.
    ///
    /// Returns the split node.
    pub fn split_exact(
        &mut self,
        node: NodeId,
        op: ArithOp,
        condition: OverflowCondition,
        state: NodeId,
    ) -> Result<NodeId, LoweringError> {
        let graph = &mut *self.graph;
        let operands: Vec<NodeId> = graph.node(node).inputs()[..op.arity()].to_vec();
        let stamp = *graph.stamp(node);

        let next = graph
            .detach_next(node)
            .ok_or(LoweringError::MissingNext(node))?;

        let deopt = self.deopt.create_deoptimization(
            graph,
            DeoptReason::ArithmeticException,
            DeoptAction::InvalidateReprofile,
            state,
        );

        let normal = graph.add(Operator::Control(ControlOp::Begin), &[], Stamp::Void);
        graph.set_next(normal, next);
        let overflow = graph.add(Operator::Control(ControlOp::Begin), &[], Stamp::Void);
        graph.set_next(overflow, deopt);

        let split = graph.add(Operator::ExactSplit(op, condition), &operands, stamp);
        graph.set_successor(split, 0, normal);
        graph.set_successor(split, 1, overflow);

        graph.replace_fixed_with_split(node, split);
        self.stats.split += 1;
        log::trace!("{node}: split into {split} ({condition:?}), deopt {deopt}");
        Ok(split)
    }
}

// =============================================================================
// Lowering Pass
// =============================================================================

pub struct ExactArithmeticLowering {
    deopt: Box<dyn DeoptimizationService>,
}

impl ExactArithmeticLowering {
    pub fn new() -> Self {
        Self::with_service(Box::new(DeoptimizeNodeFactory))
    }

    pub fn with_service(deopt: Box<dyn DeoptimizationService>) -> Self {
        ExactArithmeticLowering { deopt }
    }

    /// Lower every exact arithmetic node in `graph`.
    pub fn apply(&self, graph: &mut Graph) -> Result<LoweringStats, LoweringError> {
        if graph.stage() >= GraphStage::ExactArithmeticLowered {
            return Err(LoweringError::AlreadyLowered(graph.id()));
        }
        if !graph.is_canonical() {
            return Err(LoweringError::NotCanonical(graph.id()));
        }

        let lowerable: Vec<NodeId> = graph
            .iter()
            .filter(|(_, n)| n.op.as_lowerable().is_some())
            .map(|(id, _)| id)
            .collect();

        // Reject the graph before touching it, so a failed lowering leaves
        // it unchanged.
        for &node in &lowerable {
            if let Some(lowering) = graph.node(node).op.as_lowerable() {
                lowering.check(graph, node)?;
            }
        }

        let mut tool = LoweringTool::new(graph, self.deopt.as_ref());
        for node in lowerable {
            if !tool.graph().is_alive(node) {
                continue;
            }
            if let Some(lowering) = tool.graph().node(node).op.as_lowerable() {
                lowering.lower(&mut tool, node)?;
            }
        }
        let stats = tool.stats();

        graph.set_stage(GraphStage::ExactArithmeticLowered);
        log::debug!(
            "lowered exact arithmetic in graph {}: {} split, {} overflow-free",
            graph.id(),
            stats.split,
            stats.overflow_free
        );
        Ok(stats)
    }
}

impl Default for ExactArithmeticLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationPass for ExactArithmeticLowering {
    fn name(&self) -> &'static str {
        "lower_exact_arithmetic"
    }

    fn run(&mut self, graph: &mut Graph) -> CompileResult<bool> {
        Ok(self.apply(graph)?.changed())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::nodes::AddExactSplitNode;
    use crate::ir::stamp::IntegerStamp;
    use crate::opt::canonicalize::Canonicalizer;

    /// `start -> AddExact(x, y, fs) -> return sum`, canonicalized.
    fn exact_add(x_stamp: IntegerStamp, y_stamp: IntegerStamp) -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let x = g.add(Operator::Parameter(0), &[], Stamp::Integer(x_stamp));
        let y = g.add(Operator::Parameter(1), &[], Stamp::Integer(y_stamp));
        let fs = g.add(Operator::FrameState(7), &[x, y], Stamp::Void);
        let sum = g.add_inferred(Operator::Exact(ArithOp::AddExact), &[x, y, fs]);
        let ret = g.add_inferred(Operator::Control(ControlOp::Return), &[sum]);
        let start = g.start();
        g.set_next(start, sum);
        g.set_next(sum, ret);
        Canonicalizer::new().apply(&mut g).unwrap();
        (g, sum, ret)
    }

    #[test]
    fn test_splits_overflowing_add() {
        let (mut g, sum, ret) =
            exact_add(IntegerStamp::unrestricted(32), IntegerStamp::for_bounds(32, 1, 1));

        let stats = ExactArithmeticLowering::new().apply(&mut g).unwrap();
        assert_eq!(stats, LoweringStats { split: 1, overflow_free: 0 });
        assert!(!g.is_alive(sum));
        assert_eq!(g.stage(), GraphStage::ExactArithmeticLowered);

        let split = g.next(g.start()).unwrap();
        assert_eq!(
            g.node(split).op,
            Operator::ExactSplit(ArithOp::AddExact, OverflowCondition::Positive)
        );
        assert_eq!(g.node(ret).input(0), Some(split));

        let normal = AddExactSplitNode::normal_successor(&g, split).unwrap();
        assert_eq!(g.next(normal), Some(ret));

        let overflow = AddExactSplitNode::overflow_successor(&g, split).unwrap();
        let deopt = g.next(overflow).unwrap();
        assert_eq!(
            g.node(deopt).op,
            Operator::Deoptimize(DeoptReason::ArithmeticException, DeoptAction::InvalidateReprofile)
        );
        assert!(matches!(g.node(g.node(deopt).inputs()[0]).op, Operator::FrameState(7)));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_overflow_free_add_becomes_wrapping() {
        let (mut g, sum, ret) = exact_add(
            IntegerStamp::for_bounds(32, 0, 100),
            IntegerStamp::for_bounds(32, -5, 5),
        );

        let stats = ExactArithmeticLowering::new().apply(&mut g).unwrap();
        assert_eq!(stats, LoweringStats { split: 0, overflow_free: 1 });
        assert!(!g.is_alive(sum));

        let value = g.node(ret).input(0).unwrap();
        assert_eq!(g.node(value).op, Operator::IntOp(ArithOp::Add));
        let stamp = g.stamp(value).as_integer().unwrap();
        assert_eq!((stamp.lower_bound(), stamp.upper_bound()), (-5, 105));
        assert_eq!(g.next(g.start()), Some(ret));
        // The frame state had no other user.
        assert!(!g.iter().any(|(_, n)| matches!(n.op, Operator::FrameState(_))));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_requires_canonical_graph() {
        let (mut g, _, _) =
            exact_add(IntegerStamp::unrestricted(32), IntegerStamp::unrestricted(32));
        g.constant(crate::ir::constant::Constant::int(3));

        let err = ExactArithmeticLowering::new().apply(&mut g).unwrap_err();
        assert_eq!(err, LoweringError::NotCanonical(g.id()));
        assert_eq!(g.stage(), GraphStage::HighTier);
    }

    #[test]
    fn test_lowers_only_once() {
        let (mut g, _, _) =
            exact_add(IntegerStamp::unrestricted(32), IntegerStamp::unrestricted(32));
        let lowering = ExactArithmeticLowering::new();
        lowering.apply(&mut g).unwrap();

        assert_eq!(
            lowering.apply(&mut g),
            Err(LoweringError::AlreadyLowered(g.id()))
        );
    }

    #[test]
    fn test_missing_frame_state() {
        let mut g = Graph::new();
        let x = g.add(Operator::Parameter(0), &[], Stamp::int(32));
        let y = g.add(Operator::Parameter(1), &[], Stamp::int(32));
        let sum = g.add(
            Operator::Exact(ArithOp::AddExact),
            &[x, y, x],
            Stamp::int(32),
        );
        let ret = g.add_inferred(Operator::Control(ControlOp::Return), &[sum]);
        let start = g.start();
        g.set_next(start, sum);
        g.set_next(sum, ret);
        Canonicalizer::new().apply(&mut g).unwrap();

        assert_eq!(
            ExactArithmeticLowering::new().apply(&mut g),
            Err(LoweringError::MissingFrameState(sum))
        );
    }

    #[test]
    fn test_failed_lowering_leaves_graph_unchanged() {
        let mut b = crate::ir::builder::GraphBuilder::new();
        let x = b.parameter(0, Stamp::int(32));
        let y = b.parameter(1, Stamp::int(32));
        let first = b.add_exact(x, y, 1);
        // The second add is missing its frame state.
        let second = b.graph_mut().add(
            Operator::Exact(ArithOp::AddExact),
            &[first, y, x],
            Stamp::int(32),
        );
        b.append(second);
        b.ret(second);
        let mut g = b.finish();
        Canonicalizer::new().apply(&mut g).unwrap();
        let live = g.live_count();

        assert_eq!(
            ExactArithmeticLowering::new().apply(&mut g),
            Err(LoweringError::MissingFrameState(second))
        );
        assert_eq!(g.live_count(), live);
        assert_eq!(g.node(first).op, Operator::Exact(ArithOp::AddExact));
        assert!(!g.iter().any(|(_, n)| matches!(n.op, Operator::ExactSplit(..))));
        assert_eq!(g.stage(), GraphStage::HighTier);
        assert!(g.is_canonical());
    }

    #[test]
    fn test_stamp_error_converts() {
        let err: LoweringError = StampError::InvalidWidth(3).into();
        assert_eq!(err.to_string(), "unsupported integer width 3");
    }

    struct CountingService(std::cell::Cell<usize>);

    impl DeoptimizationService for CountingService {
        fn create_deoptimization(
            &self,
            graph: &mut Graph,
            reason: DeoptReason,
            action: DeoptAction,
            state: NodeId,
        ) -> NodeId {
            self.0.set(self.0.get() + 1);
            DeoptimizeNodeFactory.create_deoptimization(graph, reason, action, state)
        }
    }

    #[test]
    fn test_custom_deoptimization_service() {
        let (g, _, _) =
            exact_add(IntegerStamp::unrestricted(64), IntegerStamp::unrestricted(64));
        let service = CountingService(std::cell::Cell::new(0));
        let mut tool_graph = g.copy();

        let mut tool = LoweringTool::new(&mut tool_graph, &service);
        let sum = tool
            .graph()
            .iter()
            .find(|(_, n)| matches!(n.op, Operator::Exact(_)))
            .map(|(id, _)| id)
            .unwrap();
        let state = tool.graph().node(sum).inputs()[2];
        let split = tool
            .split_exact(sum, ArithOp::AddExact, OverflowCondition::Both, state)
            .unwrap();

        assert_eq!(service.0.get(), 1);
        assert_eq!(tool.stats().split, 1);
        assert!(tool.graph().node(split).op.as_lir_lowerable().is_some());

        // Lowering the copy left the original alone.
        assert!(g.iter().any(|(_, n)| matches!(n.op, Operator::Exact(_))));
    }
}
