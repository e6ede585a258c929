//! Backend code-emission hook.
//!
//! The backend implements [`ArithmeticLirGenerator`] to emit machine
//! operations on virtual registers. [`NodeLirBuilder`] maps nodes to the
//! registers holding their values and control nodes to block labels;
//! [`OperandMap`] is a ready-made one.
//!
//! [`emit_graph`] walks the graph in input-before-user order and asks every
//! LIR-lowerable node to emit itself.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ir::constant::Constant;
use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::OverflowCondition;

// =============================================================================
// Backend Interface
// =============================================================================

/// A virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LirValue(pub u32);

/// The label of the block that starts at a given control node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockLabel(pub NodeId);

/// Emits integer operations of a given width.
pub trait ArithmeticLirGenerator {
    fn emit_constant(&mut self, constant: Constant) -> LirValue;
    fn emit_negate(&mut self, value: LirValue, bits: u32) -> LirValue;
    fn emit_add(&mut self, x: LirValue, y: LirValue, bits: u32) -> LirValue;
    fn emit_sub(&mut self, x: LirValue, y: LirValue, bits: u32) -> LirValue;

    /// Emit `x + y` and a branch to `overflow` if it overflowed in one of the
    /// directions `condition` allows, falling through to `normal`.
    fn emit_add_exact_branch(
        &mut self,
        x: LirValue,
        y: LirValue,
        bits: u32,
        condition: OverflowCondition,
        normal: BlockLabel,
        overflow: BlockLabel,
    ) -> LirValue;
}

/// Node-to-location bookkeeping during emission.
pub trait NodeLirBuilder {
    /// The register holding the value of `node`, if it was emitted.
    fn operand(&self, node: NodeId) -> Option<LirValue>;
    fn set_result(&mut self, node: NodeId, value: LirValue);
    fn label(&mut self, block: NodeId) -> BlockLabel;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("{node} needs input {input}, which has no location yet")]
    MissingOperand { node: NodeId, input: NodeId },
    #[error("{0} cannot be emitted")]
    NotEmittable(NodeId),
    #[error("{0} is missing a successor")]
    MissingSuccessor(NodeId),
}

/// The location of input `index` of `node`.
pub fn operand_value(
    graph: &Graph,
    builder: &dyn NodeLirBuilder,
    node: NodeId,
    index: usize,
) -> Result<LirValue, CodegenError> {
    let input = graph
        .node(node)
        .input(index)
        .ok_or(CodegenError::NotEmittable(node))?;
    builder
        .operand(input)
        .ok_or(CodegenError::MissingOperand { node, input })
}

// =============================================================================
// Operand Map
// =============================================================================

/// Hash-map backed [`NodeLirBuilder`].
#[derive(Debug, Default)]
pub struct OperandMap {
    values: FxHashMap<NodeId, LirValue>,
}

impl OperandMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-assign a location, e.g. for parameters.
    pub fn bind(&mut self, node: NodeId, value: LirValue) {
        self.values.insert(node, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl NodeLirBuilder for OperandMap {
    fn operand(&self, node: NodeId) -> Option<LirValue> {
        self.values.get(&node).copied()
    }

    fn set_result(&mut self, node: NodeId, value: LirValue) {
        self.values.insert(node, value);
    }

    fn label(&mut self, block: NodeId) -> BlockLabel {
        BlockLabel(block)
    }
}

// =============================================================================
// Emission
// =============================================================================

/// Emit a single node.
pub fn emit_node(
    graph: &Graph,
    node: NodeId,
    builder: &mut dyn NodeLirBuilder,
    lir: &mut dyn ArithmeticLirGenerator,
) -> Result<(), CodegenError> {
    let lowerable = graph
        .node(node)
        .op
        .as_lir_lowerable()
        .ok_or(CodegenError::NotEmittable(node))?;
    lowerable.generate(graph, node, builder, lir)
}

/// Emit every LIR-lowerable node that has no location yet, inputs first.
///
/// Returns the number of nodes emitted.
pub fn emit_graph(
    graph: &Graph,
    builder: &mut dyn NodeLirBuilder,
    lir: &mut dyn ArithmeticLirGenerator,
) -> Result<usize, CodegenError> {
    let mut emitted = 0;
    let mut visited = crate::ir::arena::BitSet::with_capacity(graph.len());

    for root in graph.ids() {
        // Iterative post-order over inputs.
        let mut stack = vec![(root, false)];
        while let Some((node, inputs_done)) = stack.pop() {
            if inputs_done {
                if graph.node(node).op.as_lir_lowerable().is_some()
                    && builder.operand(node).is_none()
                {
                    emit_node(graph, node, builder, lir)?;
                    emitted += 1;
                }
                continue;
            }
            if !visited.insert(node.as_usize()) {
                continue;
            }
            stack.push((node, true));
            for &input in graph.node(node).inputs().iter().rev() {
                if !visited.contains(input.as_usize()) {
                    stack.push((input, false));
                }
            }
        }
    }

    log::debug!("emitted {emitted} nodes of graph {}", graph.id());
    Ok(emitted)
}

// =============================================================================
// Tests
// =============================================================================
