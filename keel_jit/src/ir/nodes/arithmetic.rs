//! Floating wrapping arithmetic: negate, add, sub.

use super::{
    Canonical, CanonicalizerTool, Canonicalizable, LirLowerable, NodeTemplate, StampInferable,
    constant_of, fold_input_stamps, operand,
};
use crate::codegen::{ArithmeticLirGenerator, CodegenError, NodeLirBuilder, operand_value};
use crate::ir::arith::ArithOp;
use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::Operator;
use crate::ir::stamp::Stamp;

fn width(graph: &Graph, node: NodeId) -> u32 {
    graph.stamp(node).expect_integer().bits()
}

// =============================================================================
// Negate
// =============================================================================

/// `-x`, wrapping.
pub struct NegateNode;

impl StampInferable for NegateNode {
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp {
        fold_input_stamps(ArithOp::Neg, inputs)
    }
}

impl Canonicalizable for NegateNode {
    fn canonical(&self, _tool: &dyn CanonicalizerTool, graph: &Graph, node: NodeId) -> Canonical {
        let value = operand(graph, node, 0);
        if let Some(c) = constant_of(graph, value)
            && let Ok(folded) = ArithOp::Neg.fold_constant(&[c])
        {
            return Canonical::Constant(folded);
        }
        match graph.node(value).op {
            // -(-x) == x
            Operator::IntOp(ArithOp::Neg) => Canonical::Existing(operand(graph, value, 0)),
            // -(a - b) == b - a
            Operator::IntOp(ArithOp::Sub) => {
                let a = operand(graph, value, 0);
                let b = operand(graph, value, 1);
                Canonical::New(NodeTemplate::new(Operator::IntOp(ArithOp::Sub), &[b, a]))
            }
            _ => Canonical::Unchanged,
        }
    }
}

impl LirLowerable for NegateNode {
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError> {
        let value = operand_value(graph, builder, node, 0)?;
        let result = lir.emit_negate(value, width(graph, node));
        builder.set_result(node, result);
        Ok(())
    }
}

// =============================================================================
// Add
// =============================================================================

/// `x + y`, wrapping.
pub struct AddNode;

impl StampInferable for AddNode {
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp {
        fold_input_stamps(ArithOp::Add, inputs)
    }
}

impl Canonicalizable for AddNode {
    fn canonical(&self, _tool: &dyn CanonicalizerTool, graph: &Graph, node: NodeId) -> Canonical {
        let x = operand(graph, node, 0);
        let y = operand(graph, node, 1);
        match (constant_of(graph, x), constant_of(graph, y)) {
            // Constants go on the right.
            (Some(_), None) => {
                Canonical::New(NodeTemplate::new(Operator::IntOp(ArithOp::Add), &[y, x]))
            }
            (Some(a), Some(b)) => match ArithOp::Add.fold_constant(&[a, b]) {
                Ok(folded) => Canonical::Constant(folded),
                Err(_) => Canonical::Unchanged,
            },
            (None, Some(c)) if c.is_zero() => Canonical::Existing(x),
            _ => Canonical::Unchanged,
        }
    }
}

impl LirLowerable for AddNode {
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError> {
        let x = operand_value(graph, builder, node, 0)?;
        let y = operand_value(graph, builder, node, 1)?;
        let result = lir.emit_add(x, y, width(graph, node));
        builder.set_result(node, result);
        Ok(())
    }
}

// =============================================================================
// Sub
// =============================================================================

/// `x - y`, wrapping.
pub struct SubNode;

impl StampInferable for SubNode {
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp {
        fold_input_stamps(ArithOp::Sub, inputs)
    }
}

impl Canonicalizable for SubNode {
    fn canonical(&self, _tool: &dyn CanonicalizerTool, graph: &Graph, node: NodeId) -> Canonical {
        let x = operand(graph, node, 0);
        let y = operand(graph, node, 1);
        if x == y {
            return Canonical::Constant(Constant::new(width(graph, node), 0));
        }
        match (constant_of(graph, x), constant_of(graph, y)) {
            (Some(a), Some(b)) => match ArithOp::Sub.fold_constant(&[a, b]) {
                Ok(folded) => Canonical::Constant(folded),
                Err(_) => Canonical::Unchanged,
            },
            (None, Some(c)) if c.is_zero() => Canonical::Existing(x),
            _ => Canonical::Unchanged,
        }
    }
}

impl LirLowerable for SubNode {
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError> {
        let x = operand_value(graph, builder, node, 0)?;
        let y = operand_value(graph, builder, node, 1)?;
        let result = lir.emit_sub(x, y, width(graph, node));
        builder.set_result(node, result);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Tool;

    impl CanonicalizerTool for Tool {
        fn all_usages_available(&self) -> bool {
            true
        }
    }

    fn canonical_of(graph: &Graph, node: NodeId) -> Canonical {
        graph
            .node(node)
            .op
            .as_canonicalizable()
            .unwrap()
            .canonical(&Tool, graph, node)
    }

    fn param(g: &mut Graph, index: u16) -> NodeId {
        g.add(Operator::Parameter(index), &[], Stamp::int(32))
    }

    #[test]
    fn test_negate_of_constant_folds() {
        let mut g = Graph::new();
        let c = g.constant(Constant::int(9));
        let neg = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[c]);
        assert_eq!(canonical_of(&g, neg), Canonical::Constant(Constant::int(-9)));
    }

    #[test]
    fn test_double_negation() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let inner = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[x]);
        let outer = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[inner]);
        assert_eq!(canonical_of(&g, outer), Canonical::Existing(x));
        assert_eq!(canonical_of(&g, inner), Canonical::Unchanged);
    }

    #[test]
    fn test_negate_of_sub_swaps_operands() {
        let mut g = Graph::new();
        let a = param(&mut g, 0);
        let b = param(&mut g, 1);
        let sub = g.add_inferred(Operator::IntOp(ArithOp::Sub), &[a, b]);
        let neg = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[sub]);
        assert_eq!(
            canonical_of(&g, neg),
            Canonical::New(NodeTemplate::new(Operator::IntOp(ArithOp::Sub), &[b, a]))
        );
    }

    #[test]
    fn test_add_rules() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let zero = g.constant(Constant::int(0));
        let five = g.constant(Constant::int(5));

        let swapped = g.add_inferred(Operator::IntOp(ArithOp::Add), &[five, x]);
        assert_eq!(
            canonical_of(&g, swapped),
            Canonical::New(NodeTemplate::new(Operator::IntOp(ArithOp::Add), &[x, five]))
        );

        let identity = g.add_inferred(Operator::IntOp(ArithOp::Add), &[x, zero]);
        assert_eq!(canonical_of(&g, identity), Canonical::Existing(x));

        let max = g.constant(Constant::int(i32::MAX));
        let one = g.constant(Constant::int(1));
        let wraps = g.add_inferred(Operator::IntOp(ArithOp::Add), &[max, one]);
        assert_eq!(
            canonical_of(&g, wraps),
            Canonical::Constant(Constant::int(i32::MIN))
        );
    }

    #[test]
    fn test_sub_rules() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let zero = g.constant(Constant::int(0));

        let same = g.add_inferred(Operator::IntOp(ArithOp::Sub), &[x, x]);
        assert_eq!(canonical_of(&g, same), Canonical::Constant(Constant::int(0)));

        let identity = g.add_inferred(Operator::IntOp(ArithOp::Sub), &[x, zero]);
        assert_eq!(canonical_of(&g, identity), Canonical::Existing(x));

        // No swapping: subtraction does not commute.
        let left = g.add_inferred(Operator::IntOp(ArithOp::Sub), &[zero, x]);
        assert_eq!(canonical_of(&g, left), Canonical::Unchanged);
    }
}
