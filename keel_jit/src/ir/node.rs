//! IR node definitions.
//!
//! Each node has:
//! - **Operator**: what the node computes
//! - **Inputs**: data dependencies (use-def edges), by [`NodeId`]
//! - **Successors**: control edges, for fixed nodes only
//! - **Stamp**: what the node may evaluate to
//!
//! Nodes never own other nodes. Use lists and predecessor links are kept by
//! the [`Graph`](super::graph::Graph), which is the only thing allowed to
//! rewire edges.

use smallvec::SmallVec;

use super::arena::Id;
use super::constant::Constant;
use super::operators::Operator;
use super::stamp::{Stamp, StampError};

/// Unique identifier for a node in the graph.
pub type NodeId = Id<Node>;

/// Data inputs; nearly every node has at most three.
pub type InputList = SmallVec<[NodeId; 4]>;

/// Control successors; at most two in this IR.
pub type SuccessorList = SmallVec<[NodeId; 2]>;

// =============================================================================
// Node
// =============================================================================

#[derive(Clone)]
pub struct Node {
    /// The operation this node performs.
    pub op: Operator,

    /// Input nodes. Rewire through the graph so use lists stay in sync.
    pub(crate) inputs: InputList,

    /// Control successors (fixed nodes only).
    pub(crate) successors: SuccessorList,

    stamp: Stamp,

    pub flags: NodeFlags,
}

impl Node {
    pub fn new(op: Operator, inputs: InputList, stamp: Stamp) -> Self {
        Node {
            op,
            inputs,
            successors: SuccessorList::new(),
            stamp,
            flags: NodeFlags::empty(),
        }
    }

    #[inline]
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    #[inline]
    pub fn input(&self, index: usize) -> Option<NodeId> {
        self.inputs.get(index).copied()
    }

    #[inline]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// The single control successor of a fixed-with-next node.
    #[inline]
    pub fn next(&self) -> Option<NodeId> {
        self.successors.first().copied()
    }

    #[inline]
    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    /// Replace the stamp with a narrower one.
    ///
    /// Returns whether the stamp changed. A stamp that is not contained in
    /// the current one is rejected: stamps only ever narrow.
    pub fn narrow_stamp(&mut self, stamp: Stamp) -> Result<bool, StampError> {
        if stamp == self.stamp {
            return Ok(false);
        }
        if !stamp.fits_in(&self.stamp) {
            return Err(StampError::Widening {
                current: self.stamp.to_string(),
                new: stamp.to_string(),
            });
        }
        self.stamp = stamp;
        Ok(true)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.op, Operator::Constant(_))
    }

    pub fn as_constant(&self) -> Option<Constant> {
        self.op.as_constant()
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.op.is_fixed()
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    pub(crate) fn mark_dead(&mut self) {
        self.flags.insert(NodeFlags::DEAD);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.op)?;
        if !self.inputs.is_empty() {
            write!(f, " {:?}", self.inputs.as_slice())?;
        }
        if !self.successors.is_empty() {
            write!(f, " -> {:?}", self.successors.as_slice())?;
        }
        write!(f, " : {:?}", self.stamp)
    }
}

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node has been killed; its slot stays until the graph is copied.
        const DEAD = 0b0000_0001;
        /// Node survives even without usages (parameters).
        const PINNED = 0b0000_0010;
    }
}

// =============================================================================
// Tests
// =============================================================================
