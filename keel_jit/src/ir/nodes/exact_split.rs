//! Lowered exact addition: compute the wrapped sum, then branch on overflow.
//!
//! Inputs are `[x, y]`. Successor 0 is the normal path, which sees the sum;
//! successor 1 is the overflow path, which leads to a deoptimization exit
//! and never observes the wrapped value.

use super::{LirLowerable, StampInferable, fold_input_stamps};
use crate::codegen::{ArithmeticLirGenerator, CodegenError, NodeLirBuilder, operand_value};
use crate::ir::arith::ArithOp;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::Operator;
use crate::ir::stamp::Stamp;

pub struct AddExactSplitNode;

impl AddExactSplitNode {
    pub fn normal_successor(graph: &Graph, node: NodeId) -> Option<NodeId> {
        graph.node(node).successors().first().copied()
    }

    pub fn overflow_successor(graph: &Graph, node: NodeId) -> Option<NodeId> {
        graph.node(node).successors().get(1).copied()
    }
}

impl StampInferable for AddExactSplitNode {
    fn infer_stamp(&self, inputs: &[Stamp]) -> Stamp {
        fold_input_stamps(ArithOp::AddExact, inputs)
    }
}

impl LirLowerable for AddExactSplitNode {
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError> {
        let Operator::ExactSplit(_, condition) = graph.node(node).op else {
            return Err(CodegenError::NotEmittable(node));
        };
        let (Some(normal), Some(overflow)) = (
            Self::normal_successor(graph, node),
            Self::overflow_successor(graph, node),
        ) else {
            return Err(CodegenError::MissingSuccessor(node));
        };

        let x = operand_value(graph, builder, node, 0)?;
        let y = operand_value(graph, builder, node, 1)?;
        let bits = graph.stamp(node).expect_integer().bits();
        let normal = builder.label(normal);
        let overflow = builder.label(overflow);
        let result = lir.emit_add_exact_branch(x, y, bits, condition, normal, overflow);
        builder.set_result(node, result);
        Ok(())
    }
}
