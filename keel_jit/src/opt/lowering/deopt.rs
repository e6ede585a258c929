//! The deoptimization service contract.
//!
//! Lowering asks the service for a terminal node meaning "leave compiled
//! code here and resume in the fallback at this frame state". How the
//! runtime performs the transfer is the service's business.

use crate::ir::graph::Graph;
use crate::ir::node::NodeId;
use crate::ir::operators::{DeoptAction, DeoptReason, Operator};
use crate::ir::stamp::Stamp;

pub trait DeoptimizationService {
    /// Create an unlinked terminal node that deoptimizes to `state`.
    fn create_deoptimization(
        &self,
        graph: &mut Graph,
        reason: DeoptReason,
        action: DeoptAction,
        state: NodeId,
    ) -> NodeId;
}

/// Emits a plain `Deoptimize` node consuming the frame state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeoptimizeNodeFactory;

impl DeoptimizationService for DeoptimizeNodeFactory {
    fn create_deoptimization(
        &self,
        graph: &mut Graph,
        reason: DeoptReason,
        action: DeoptAction,
        state: NodeId,
    ) -> NodeId {
        debug_assert!(matches!(graph.node(state).op, Operator::FrameState(_)));
        graph.add(Operator::Deoptimize(reason, action), &[state], Stamp::Void)
    }
}
