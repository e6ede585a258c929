//! FIFO node worklist with membership tracking.

use std::collections::VecDeque;

use crate::ir::arena::BitSet;
use crate::ir::node::NodeId;

/// Each node is queued at most once at a time.
#[derive(Debug, Default)]
pub struct Worklist {
    queue: VecDeque<NodeId>,
    queued: BitSet,
}

impl Worklist {
    pub fn with_capacity(nodes: usize) -> Self {
        Worklist {
            queue: VecDeque::with_capacity(nodes),
            queued: BitSet::with_capacity(nodes),
        }
    }

    /// Queue `node` unless it is already queued. Returns whether it was added.
    pub fn push(&mut self, node: NodeId) -> bool {
        let fresh = self.queued.insert(node.as_usize());
        if fresh {
            self.queue.push_back(node);
        }
        fresh
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            self.push(node);
        }
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        let node = self.queue.pop_front()?;
        self.queued.remove(node.as_usize());
        Some(node)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
