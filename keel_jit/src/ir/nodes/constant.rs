//! Constants materialize directly into the backend.

use super::LirLowerable;
use crate::codegen::{ArithmeticLirGenerator, CodegenError, NodeLirBuilder};
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;

pub struct ConstantNode;

impl LirLowerable for ConstantNode {
    fn generate(
        &self,
        graph: &Graph,
        node: NodeId,
        builder: &mut dyn NodeLirBuilder,
        lir: &mut dyn ArithmeticLirGenerator,
    ) -> Result<(), CodegenError> {
        let constant = graph
            .node(node)
            .as_constant()
            .ok_or(CodegenError::NotEmittable(node))?;
        let value = lir.emit_constant(constant);
        builder.set_result(node, value);
        Ok(())
    }
}
