//! Overflow-checked addition.
//!
//! `AddExact` is a fixed node with inputs `[x, y, state_before]`. If the sum
//! overflows, execution must resume in the fallback at `state_before`, so
//! the node stays in control flow until lowering turns it into an
//! [`AddExactSplitNode`](super::AddExactSplitNode).

use super::{
    Canonical, CanonicalizerTool, Canonicalizable, Lowerable, NodeTemplate, StampInferable,
    constant_of, fold_input_stamps, operand,
};
use crate::ir::arith::ArithOp;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{Operator, OverflowCondition};
use crate::ir::stamp::{IntegerStamp, Stamp, add_overflows_negatively, add_overflows_positively};
use crate::opt::lowering::{LoweringError, LoweringTool};

pub struct AddExactNode;

impl AddExactNode {
    /// The frame state execution resumes from on overflow.
    pub fn state_before(graph: &Graph, node: NodeId) -> Option<NodeId> {
        graph
            .node(node)
            .input(2)
            .filter(|&s| matches!(graph.node(s).op, Operator::FrameState(_)))
    }
}

/// Whether adding any values of `a` and `b` can leave the width.
pub fn add_can_overflow(a: &IntegerStamp, b: &IntegerStamp) -> bool {
    add_overflow_condition(a, b).is_some()
}

/// The overflow directions that adding values of `a` and `b` can take, or
/// `None` if the sum always fits.
pub fn add_overflow_condition(a: &IntegerStamp, b: &IntegerStamp) -> Option<OverflowCondition> {
    let bits = a.bits();
    let positive = add_overflows_positively(a.upper_bound(), b.upper_bound(), bits);
    let negative = add_overflows_negatively(a.lower_bound(), b.lower_bound(), bits);
    match (positive, negative) {
        (true, true) => Some(OverflowCondition::Both),
        (true, false) => Some(OverflowCondition::Positive),
        (false, true) => Some(OverflowCondition::Negative),
        (false, false) => None,
    }
}

impl StampInferable for AddExactNode {
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp {
        fold_input_stamps(ArithOp::AddExact, inputs)
    }
}

impl Canonicalizable for AddExactNode {
    fn canonical(&self, _tool: &dyn CanonicalizerTool, graph: &Graph, node: NodeId) -> Canonical {
        let x = operand(graph, node, 0);
        let y = operand(graph, node, 1);
        let node_ref = graph.node(node);

        match (constant_of(graph, x), constant_of(graph, y)) {
            // Constant first: swap, then look again on the next visit.
            (Some(_), None) => {
                let mut inputs = node_ref.inputs().to_vec();
                inputs.swap(0, 1);
                Canonical::New(NodeTemplate::new(node_ref.op, &inputs))
            }
            // An overflowing fold keeps the node so the trap survives.
            (Some(a), Some(b)) => match ArithOp::AddExact.fold_constant(&[a, b]) {
                Ok(sum) => Canonical::Constant(sum),
                Err(overflow) => {
                    log::trace!("not folding {node}: {overflow}");
                    Canonical::Unchanged
                }
            },
            (None, Some(c)) if c.is_zero() => Canonical::Existing(x),
            _ => Canonical::Unchanged,
        }
    }
}

impl Lowerable for AddExactNode {
    fn check(&self, graph: &Graph, node: NodeId) -> Result<(), LoweringError> {
        let a = *graph.stamp(operand(graph, node, 0)).expect_integer();
        let b = *graph.stamp(operand(graph, node, 1)).expect_integer();
        if add_can_overflow(&a, &b) {
            Self::state_before(graph, node).ok_or(LoweringError::MissingFrameState(node))?;
            graph.next(node).ok_or(LoweringError::MissingNext(node))?;
        }
        Ok(())
    }

    fn lower(&self, tool: &mut LoweringTool<'_>, node: NodeId) -> Result<(), LoweringError> {
        let graph = tool.graph();
        let x = operand(graph, node, 0);
        let y = operand(graph, node, 1);
        let a = *graph.stamp(x).expect_integer();
        let b = *graph.stamp(y).expect_integer();

        match add_overflow_condition(&a, &b) {
            None => tool.replace_with_wrapping(node, ArithOp::Add),
            Some(condition) => {
                let state = Self::state_before(tool.graph(), node)
                    .ok_or(LoweringError::MissingFrameState(node))?;
                tool.split_exact(node, ArithOp::AddExact, condition, state)
                    .map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::constant::Constant;

    struct Tool;

    impl CanonicalizerTool for Tool {
        fn all_usages_available(&self) -> bool {
            true
        }
    }

    fn exact(g: &mut Graph, x: NodeId, y: NodeId) -> NodeId {
        let state = g.add(Operator::FrameState(0), &[], Stamp::Void);
        g.add_inferred(Operator::Exact(ArithOp::AddExact), &[x, y, state])
    }

    fn canonical(g: &Graph, node: NodeId) -> Canonical {
        AddExactNode.canonical(&Tool, g, node)
    }

    #[test]
    fn test_folds_in_range_constants() {
        let mut g = Graph::new();
        let three = g.constant(Constant::int(3));
        let four = g.constant(Constant::int(4));
        let add = exact(&mut g, three, four);
        assert_eq!(canonical(&g, add), Canonical::Constant(Constant::int(7)));
    }

    #[test]
    fn test_keeps_overflowing_constants() {
        let mut g = Graph::new();
        let max = g.constant(Constant::int(i32::MAX));
        let one = g.constant(Constant::int(1));
        let add = exact(&mut g, max, one);
        assert_eq!(canonical(&g, add), Canonical::Unchanged);
    }

    #[test]
    fn test_moves_constant_right() {
        let mut g = Graph::new();
        let five = g.constant(Constant::int(5));
        let x = g.add(Operator::Parameter(0), &[], Stamp::int(32));
        let add = exact(&mut g, five, x);
        let state = AddExactNode::state_before(&g, add).unwrap();
        assert_eq!(
            canonical(&g, add),
            Canonical::New(NodeTemplate::new(
                Operator::Exact(ArithOp::AddExact),
                &[x, five, state]
            ))
        );
    }

    #[test]
    fn test_zero_only_removed_on_the_right() {
        let mut g = Graph::new();
        let zero = g.constant(Constant::int(0));
        let x = g.add(Operator::Parameter(0), &[], Stamp::int(32));

        let right = exact(&mut g, x, zero);
        assert_eq!(canonical(&g, right), Canonical::Existing(x));

        // Zero on the left is swapped first, not removed.
        let left = exact(&mut g, zero, x);
        assert!(matches!(canonical(&g, left), Canonical::New(_)));
    }

    #[test]
    fn test_overflow_condition_from_bounds() {
        let small = IntegerStamp::for_bounds(32, -10, 10);
        let positive = IntegerStamp::for_bounds(32, 0, i32::MAX as i64);
        let negative = IntegerStamp::for_bounds(32, i32::MIN as i64, -1);

        assert_eq!(add_overflow_condition(&small, &small), None);
        assert_eq!(
            add_overflow_condition(&positive, &IntegerStamp::for_constant(32, 1)),
            Some(OverflowCondition::Positive)
        );
        assert_eq!(
            add_overflow_condition(&negative, &IntegerStamp::for_constant(32, -1)),
            Some(OverflowCondition::Negative)
        );
        let full = IntegerStamp::unrestricted(32);
        assert_eq!(add_overflow_condition(&full, &full), Some(OverflowCondition::Both));
        assert!(!add_can_overflow(&small, &small));
    }
}
