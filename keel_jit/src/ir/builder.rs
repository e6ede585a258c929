//! Graph construction helpers.
//!
//! [`GraphBuilder`] tracks the last fixed node so straight-line code can be
//! appended in program order. Floating arithmetic is created with inferred
//! stamps; exact arithmetic gets a frame state and is linked into control
//! flow.

use super::arith::ArithOp;
use super::constant::Constant;
use super::graph::Graph;
use super::node::NodeId;
use super::operators::{ControlOp, Operator};
use super::stamp::Stamp;

pub struct GraphBuilder {
    graph: Graph,
    /// Last fixed node; the next fixed node is appended after it.
    control: NodeId,
    parameters: Vec<NodeId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        let graph = Graph::new();
        let control = graph.start();
        GraphBuilder {
            graph,
            control,
            parameters: Vec::new(),
        }
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    #[inline]
    pub fn control(&self) -> NodeId {
        self.control
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Declare parameter `index` with the stamp the caller guarantees.
    pub fn parameter(&mut self, index: u16, stamp: Stamp) -> NodeId {
        let param = self.graph.add(Operator::Parameter(index), &[], stamp);
        self.parameters.push(param);
        param
    }

    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    pub fn constant(&mut self, constant: Constant) -> NodeId {
        self.graph.constant(constant)
    }

    pub fn int(&mut self, value: i32) -> NodeId {
        self.constant(Constant::int(value))
    }

    pub fn long(&mut self, value: i64) -> NodeId {
        self.constant(Constant::long(value))
    }

    pub fn negate(&mut self, value: NodeId) -> NodeId {
        self.graph.add_inferred(Operator::IntOp(ArithOp::Neg), &[value])
    }

    pub fn add(&mut self, x: NodeId, y: NodeId) -> NodeId {
        self.graph.add_inferred(Operator::IntOp(ArithOp::Add), &[x, y])
    }

    pub fn sub(&mut self, x: NodeId, y: NodeId) -> NodeId {
        self.graph.add_inferred(Operator::IntOp(ArithOp::Sub), &[x, y])
    }

    // =========================================================================
    // Deoptimization State
    // =========================================================================

    /// A frame state at bytecode index `bci` capturing `values`.
    pub fn frame_state(&mut self, bci: u32, values: &[NodeId]) -> NodeId {
        self.graph.add(Operator::FrameState(bci), values, Stamp::Void)
    }

    /// Append `x + y` with an overflow check, resuming at `bci` with both
    /// operands live if it overflows.
    pub fn add_exact(&mut self, x: NodeId, y: NodeId, bci: u32) -> NodeId {
        let state = self.frame_state(bci, &[x, y]);
        self.add_exact_with_state(x, y, state)
    }

    pub fn add_exact_with_state(&mut self, x: NodeId, y: NodeId, state: NodeId) -> NodeId {
        let node = self
            .graph
            .add_inferred(Operator::Exact(ArithOp::AddExact), &[x, y, state]);
        self.append(node)
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Link an unlinked fixed node after the current control node.
    pub fn append(&mut self, node: NodeId) -> NodeId {
        debug_assert!(self.graph.node(node).is_fixed());
        self.graph.set_next(self.control, node);
        self.control = node;
        node
    }

    pub fn ret(&mut self, value: NodeId) -> NodeId {
        let ret = self
            .graph
            .add(Operator::Control(ControlOp::Return), &[value], Stamp::Void);
        self.append(ret)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
