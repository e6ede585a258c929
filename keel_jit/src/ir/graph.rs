//! Sea-of-Nodes graph structure.
//!
//! The graph provides:
//! - **Arena-based storage**: nodes addressed by [`NodeId`], never by pointer
//! - **Use-def chains**: every input edge is mirrored in the use list of its
//!   target
//! - **Control links**: fixed nodes list their successors; the graph keeps
//!   the reverse predecessor link
//! - **Constant uniquing**: one live node per distinct constant
//!
//! Every structural change bumps a mutation epoch. Passes use it to tell
//! whether the graph changed since they last saw it.
//!
//! A graph is duplicated with [`Graph::copy_with`], which compacts away
//! killed nodes and reports the old-to-new node mapping to a callback.

use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

use super::arena::{Arena, SecondaryMap};
use super::constant::Constant;
use super::node::{InputList, Node, NodeFlags, NodeId};
use super::operators::{ControlOp, Operator};
use super::stamp::{Stamp, StampError};

// =============================================================================
// Identity & Stage
// =============================================================================

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique graph identity. Copies get a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u64);

impl GraphId {
    fn fresh() -> Self {
        GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// How far down the pipeline a graph has been taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphStage {
    /// As built by the front end; exact arithmetic is still a single node.
    HighTier,
    /// Exact arithmetic has been split into explicit control flow.
    ExactArithmeticLowered,
}

/// Old node to new node, as produced by [`Graph::copy_with`].
pub type DuplicationMap = FxHashMap<NodeId, NodeId>;

// =============================================================================
// Errors
// =============================================================================

/// Structural inconsistencies found by [`Graph::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("{node} has input {input}, which is not in the graph")]
    InvalidInput { node: NodeId, input: NodeId },
    #[error("{node} uses dead node {input}")]
    DeadInput { node: NodeId, input: NodeId },
    #[error("{user} uses {def} but is missing from its use list")]
    MissingUse { def: NodeId, user: NodeId },
    #[error("use list of {def} names {user}, which does not use it")]
    StaleUse { def: NodeId, user: NodeId },
    #[error("{node} has {found} successors, at most {expected} allowed")]
    SuccessorCount {
        node: NodeId,
        found: usize,
        expected: usize,
    },
    #[error("{node} lists successor {successor}, whose predecessor is {actual:?}")]
    PredecessorMismatch {
        node: NodeId,
        successor: NodeId,
        actual: Option<NodeId>,
    },
    #[error("floating node {node} has control edges")]
    FloatingWithControl { node: NodeId },
    #[error("{node} has stamp {stamp}, incompatible with {expected}")]
    StampMismatch {
        node: NodeId,
        stamp: Stamp,
        expected: Stamp,
    },
    #[error("start node {0} has inputs or a predecessor")]
    MalformedStart(NodeId),
}

// =============================================================================
// Graph Structure
// =============================================================================

/// A Sea-of-Nodes graph.
///
/// The graph owns all nodes. Edges are only ever rewired through graph
/// methods, which keep use lists and predecessor links consistent.
pub struct Graph {
    id: GraphId,
    nodes: Arena<Node>,

    /// For each node, the nodes that have it as an input (one entry per edge).
    uses: SecondaryMap<Node, Vec<NodeId>>,

    /// For each fixed node, the node that lists it as a successor.
    predecessors: SecondaryMap<Node, Option<NodeId>>,

    constants: FxHashMap<Constant, NodeId>,

    start: NodeId,
    stage: GraphStage,
    epoch: u64,
    canonical_epoch: Option<u64>,
    live: usize,
}

impl Graph {
    /// Create a graph containing only its start node.
    pub fn new() -> Self {
        let mut nodes = Arena::with_capacity(64);
        let mut start_node = Node::new(
            Operator::Control(ControlOp::Start),
            InputList::new(),
            Stamp::Void,
        );
        start_node.flags.insert(NodeFlags::PINNED);
        let start = nodes.alloc(start_node);

        Graph {
            id: GraphId::fresh(),
            nodes,
            uses: SecondaryMap::new(),
            predecessors: SecondaryMap::new(),
            constants: FxHashMap::default(),
            start,
            stage: GraphStage::HighTier,
            epoch: 0,
            canonical_epoch: None,
            live: 1,
        }
    }

    #[inline]
    pub fn id(&self) -> GraphId {
        self.id
    }

    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    #[inline]
    pub fn stage(&self) -> GraphStage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: GraphStage) {
        self.stage = stage;
        self.touch();
    }

    /// Mutation counter, bumped by every structural change.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the canonicalizer reached its fixpoint on exactly this graph.
    pub fn is_canonical(&self) -> bool {
        self.canonical_epoch == Some(self.epoch)
    }

    pub(crate) fn mark_canonical(&mut self) {
        self.canonical_epoch = Some(self.epoch);
    }

    #[inline]
    fn touch(&mut self) {
        self.epoch += 1;
    }

    // =========================================================================
    // Node Access
    // =========================================================================

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether `id` names a node that has not been killed.
    #[inline]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| !n.is_dead())
    }

    #[inline]
    pub fn stamp(&self, id: NodeId) -> &Stamp {
        self.nodes[id].stamp()
    }

    /// Number of slots, including killed nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Whether the graph holds nothing but its start node.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live <= 1
    }

    /// Iterate over live nodes with their IDs, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().filter(|(_, n)| !n.is_dead())
    }

    /// Live node IDs, in allocation order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    // =========================================================================
    // Node Creation
    // =========================================================================

    /// Add a node with an explicit stamp. Successors are linked separately.
    pub fn add(&mut self, op: Operator, inputs: &[NodeId], stamp: Stamp) -> NodeId {
        let mut node = Node::new(op, InputList::from_slice(inputs), stamp);
        if matches!(op, Operator::Parameter(_)) {
            node.flags.insert(NodeFlags::PINNED);
        }
        let id = self.nodes.alloc(node);
        self.uses.ensure(id);
        self.predecessors.ensure(id);
        for &input in inputs {
            self.add_use(input, id);
        }
        self.live += 1;
        self.touch();
        id
    }

    /// Add a node whose stamp follows from its operator and inputs.
    pub fn add_inferred(&mut self, op: Operator, inputs: &[NodeId]) -> NodeId {
        let stamp = match self.infer_stamp(&op, inputs) {
            Some(stamp) => stamp,
            None => panic!("{op} needs an explicit stamp"),
        };
        self.add(op, inputs, stamp)
    }

    /// The uniqued node for `constant`, created on first request.
    pub fn constant(&mut self, constant: Constant) -> NodeId {
        if let Some(&id) = self.constants.get(&constant)
            && self.is_alive(id)
        {
            return id;
        }
        let id = self.add(
            Operator::Constant(constant),
            &[],
            Stamp::Integer(constant.stamp()),
        );
        self.constants.insert(constant, id);
        id
    }

    /// The stamp `op` would have over `inputs`, or `None` if it must be given.
    pub fn infer_stamp(&self, op: &Operator, inputs: &[NodeId]) -> Option<Stamp> {
        if let Operator::Constant(c) = op {
            return Some(Stamp::Integer(c.stamp()));
        }
        if let Some(inferable) = op.as_stamp_inferable() {
            let stamps: SmallVec<[Stamp; 4]> = inputs.iter().map(|&i| *self.stamp(i)).collect();
            return Some(inferable.infer_stamp(&stamps));
        }
        op.is_void().then_some(Stamp::Void)
    }

    /// Narrow the stamp of `id`; widening is rejected.
    pub fn narrow_stamp(&mut self, id: NodeId, stamp: Stamp) -> Result<bool, StampError> {
        let changed = self.nodes[id].narrow_stamp(stamp)?;
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    // =========================================================================
    // Use-Def Chains
    // =========================================================================

    /// Nodes that have `id` as an input, once per edge.
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        self.uses.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn use_count(&self, id: NodeId) -> usize {
        self.uses(id).len()
    }

    pub fn has_no_usages(&self, id: NodeId) -> bool {
        self.uses(id).is_empty()
    }

    /// Distinct users of `id`.
    pub fn users(&self, id: NodeId) -> Vec<NodeId> {
        let mut users = self.uses(id).to_vec();
        users.sort_unstable();
        users.dedup();
        users
    }

    fn add_use(&mut self, def: NodeId, user: NodeId) {
        self.uses.entry(def).push(user);
    }

    fn remove_use(&mut self, def: NodeId, user: NodeId) {
        if let Some(uses) = self.uses.get_mut(def)
            && let Some(pos) = uses.iter().position(|&u| u == user)
        {
            uses.swap_remove(pos);
        }
    }

    // =========================================================================
    // Control Links
    // =========================================================================

    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.predecessors.get(id).copied().flatten()
    }

    #[inline]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].next()
    }

    /// Make `successor` the `index`-th successor of `node`. A successor
    /// previously in that slot loses its predecessor.
    pub fn set_successor(&mut self, node: NodeId, index: usize, successor: NodeId) {
        assert!(
            self.predecessor(successor).is_none(),
            "{successor} already has predecessor {:?}",
            self.predecessor(successor)
        );
        let successors = &mut self.nodes[node].successors;
        let old = if index < successors.len() {
            Some(std::mem::replace(&mut successors[index], successor))
        } else {
            assert_eq!(index, successors.len(), "successor slots must be filled in order");
            successors.push(successor);
            None
        };
        if let Some(old) = old {
            self.predecessors.set(old, None);
        }
        self.predecessors.set(successor, Some(node));
        self.touch();
    }

    #[inline]
    pub fn set_next(&mut self, node: NodeId, next: NodeId) {
        self.set_successor(node, 0, next);
    }

    /// Detach and return the successor of a fixed-with-next node.
    pub fn detach_next(&mut self, node: NodeId) -> Option<NodeId> {
        let next = self.nodes[node].successors.pop()?;
        debug_assert!(self.nodes[node].successors.is_empty());
        self.predecessors.set(next, None);
        self.touch();
        Some(next)
    }

    /// Point the predecessor of `old` at `new` instead.
    fn replace_at_predecessor(&mut self, old: NodeId, new: Option<NodeId>) {
        let Some(pred) = self.predecessor(old) else {
            return;
        };
        self.predecessors.set(old, None);
        match new {
            Some(new) => {
                for slot in self.nodes[pred].successors.iter_mut() {
                    if *slot == old {
                        *slot = new;
                    }
                }
                self.predecessors.set(new, Some(pred));
            }
            None => self.nodes[pred].successors.retain(|s| *s != old),
        }
    }

    // =========================================================================
    // Node Modification
    // =========================================================================

    pub fn replace_input(&mut self, node: NodeId, index: usize, new_input: NodeId) {
        let old = self.nodes[node].inputs[index];
        if old == new_input {
            return;
        }
        self.remove_use(old, node);
        self.nodes[node].inputs[index] = new_input;
        self.add_use(new_input, node);
        self.touch();
    }

    /// Rewire every input edge pointing at `old` to point at `new`.
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let users = self.users(old);
        for user in users {
            let inputs = &mut self.nodes[user].inputs;
            for slot in inputs.iter_mut() {
                if *slot == old {
                    *slot = new;
                    self.uses.entry(new).push(user);
                }
            }
        }
        if let Some(uses) = self.uses.get_mut(old) {
            uses.clear();
        }
        self.touch();
    }

    /// Put the unlinked fixed node `new` where `old` is in control flow,
    /// move all usages of `old` to `new`, and kill `old`.
    pub fn replace_fixed_with_fixed(&mut self, old: NodeId, new: NodeId) {
        assert!(self.node(old).is_fixed() && self.node(new).is_fixed());
        assert!(
            self.predecessor(new).is_none() && self.node(new).successors.is_empty(),
            "replacement {new} is already linked into control flow"
        );
        let next = self.detach_next(old);
        self.replace_at_usages(old, new);
        self.replace_at_predecessor(old, Some(new));
        if let Some(next) = next {
            self.set_next(new, next);
        }
        self.kill_with_unused_floating_inputs(old);
    }

    /// Move all usages of the fixed node `old` to `replacement` (a node
    /// already placed, usually floating), unlink `old` from control flow
    /// and kill it.
    pub fn replace_fixed_with_floating(&mut self, old: NodeId, replacement: NodeId) {
        assert!(self.node(old).is_fixed());
        self.replace_at_usages(old, replacement);
        self.remove_fixed(old);
        self.kill_with_unused_floating_inputs(old);
    }

    /// Put `split`, whose successors are already linked, where `old` is in
    /// control flow. `old` must have been detached from its own successor.
    pub fn replace_fixed_with_split(&mut self, old: NodeId, split: NodeId) {
        assert!(
            self.node(old).successors.is_empty(),
            "{old} still has successors"
        );
        assert!(self.predecessor(split).is_none());
        self.replace_at_usages(old, split);
        self.replace_at_predecessor(old, Some(split));
        self.kill_with_unused_floating_inputs(old);
    }

    /// Unlink a fixed-with-next node, connecting its predecessor to its
    /// successor.
    pub fn remove_fixed(&mut self, node: NodeId) {
        let next = self.detach_next(node);
        self.replace_at_predecessor(node, next);
    }

    /// Mark a node dead and drop its input edges. It must have no usages and
    /// must already be unlinked from its predecessor.
    pub fn kill(&mut self, id: NodeId) {
        assert!(self.has_no_usages(id), "cannot kill {id}: it still has usages");
        assert!(
            self.predecessor(id).is_none(),
            "cannot kill {id}: it is still linked into control flow"
        );
        let node = &mut self.nodes[id];
        node.mark_dead();
        let inputs = std::mem::take(&mut node.inputs);
        let successors = std::mem::take(&mut node.successors);
        let op = node.op;

        for input in inputs {
            self.remove_use(input, id);
        }
        for successor in successors {
            self.predecessors.set(successor, None);
        }
        if let Operator::Constant(c) = op
            && self.constants.get(&c) == Some(&id)
        {
            self.constants.remove(&c);
        }
        self.live -= 1;
        self.touch();
    }

    /// Kill `id`, then every floating input left without usages, transitively.
    pub fn kill_with_unused_floating_inputs(&mut self, id: NodeId) {
        let mut worklist = vec![id];
        while let Some(node) = worklist.pop() {
            if !self.is_alive(node) {
                continue;
            }
            let inputs = self.nodes[node].inputs.clone();
            self.kill(node);
            for input in inputs {
                let candidate = &self.nodes[input];
                if !candidate.is_dead()
                    && !candidate.is_fixed()
                    && !candidate.flags.contains(NodeFlags::PINNED)
                    && self.has_no_usages(input)
                {
                    worklist.push(input);
                }
            }
        }
    }

    // =========================================================================
    // Duplication
    // =========================================================================

    /// Duplicate the graph. See [`Graph::copy_with`].
    pub fn copy(&self) -> Graph {
        self.copy_with(|_| {})
    }

    /// Duplicate the graph, compacting away killed nodes, and hand the
    /// old-to-new node mapping to `callback` so external references into
    /// this graph can be translated.
    ///
    /// The copy has a fresh identity and is structurally identical: same
    /// operators, stamps, edge order and stage.
    pub fn copy_with(&self, callback: impl FnOnce(&DuplicationMap)) -> Graph {
        let mut map = DuplicationMap::default();
        map.reserve(self.live);
        for (new_index, (old, _)) in self.iter().enumerate() {
            map.insert(old, NodeId::new(new_index as u32));
        }

        let mut nodes = Arena::with_capacity(self.live);
        let mut uses = SecondaryMap::new();
        let mut predecessors = SecondaryMap::new();
        for (old, node) in self.iter() {
            let mut copy = node.clone();
            for input in copy.inputs.iter_mut() {
                *input = map[&*input];
            }
            for successor in copy.successors.iter_mut() {
                *successor = map[&*successor];
            }
            let new = nodes.alloc(copy);
            uses.set(new, self.uses(old).iter().map(|u| map[u]).collect());
            predecessors.set(new, self.predecessor(old).map(|p| map[&p]));
        }

        let constants = self
            .constants
            .iter()
            .filter_map(|(c, id)| map.get(id).map(|new| (*c, *new)))
            .collect();

        let graph = Graph {
            id: GraphId::fresh(),
            nodes,
            uses,
            predecessors,
            constants,
            start: map[&self.start],
            stage: self.stage,
            epoch: 0,
            canonical_epoch: self.is_canonical().then_some(0),
            live: self.live,
        };
        log::trace!(
            "copied graph {} -> {} ({} live nodes)",
            self.id,
            graph.id,
            graph.live
        );
        callback(&map);
        graph
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Check edge symmetry, control-link symmetry and stamp compatibility.
    pub fn verify(&self) -> Result<(), GraphError> {
        let start = self.node(self.start);
        if !start.inputs.is_empty() || self.predecessor(self.start).is_some() {
            return Err(GraphError::MalformedStart(self.start));
        }

        for (id, node) in self.iter() {
            for &input in node.inputs() {
                match self.get(input) {
                    None => return Err(GraphError::InvalidInput { node: id, input }),
                    Some(n) if n.is_dead() => {
                        return Err(GraphError::DeadInput { node: id, input });
                    }
                    Some(_) => {}
                }
                let edges = node.inputs().iter().filter(|&&i| i == input).count();
                let recorded = self.uses(input).iter().filter(|&&u| u == id).count();
                if edges != recorded {
                    return Err(GraphError::MissingUse {
                        def: input,
                        user: id,
                    });
                }
            }

            for &user in self.uses(id) {
                if !self.is_alive(user) || !self.node(user).inputs().contains(&id) {
                    return Err(GraphError::StaleUse { def: id, user });
                }
            }

            if node.is_fixed() {
                let expected = node.op.successor_count();
                if node.successors().len() > expected {
                    return Err(GraphError::SuccessorCount {
                        node: id,
                        found: node.successors().len(),
                        expected,
                    });
                }
                for &successor in node.successors() {
                    let actual = self.predecessor(successor);
                    if actual != Some(id) || !self.is_alive(successor) {
                        return Err(GraphError::PredecessorMismatch {
                            node: id,
                            successor,
                            actual,
                        });
                    }
                }
            } else if !node.successors().is_empty() || self.predecessor(id).is_some() {
                return Err(GraphError::FloatingWithControl { node: id });
            }

            if let Some(expected) = self.infer_stamp(&node.op, node.inputs())
                && !node.stamp().is_compatible(&expected)
            {
                return Err(GraphError::StampMismatch {
                    node: id,
                    stamp: *node.stamp(),
                    expected,
                });
            }
        }

        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph {} ({} live nodes):", self.id, self.live)?;
        for (id, node) in self.iter() {
            writeln!(f, "  {:?}: {:?}", id, node)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::arith::ArithOp;
    use crate::ir::operators::{DeoptAction, DeoptReason};

    fn param(g: &mut Graph, index: u16) -> NodeId {
        g.add(Operator::Parameter(index), &[], Stamp::int(32))
    }

    #[test]
    fn test_graph_creation() {
        let g = Graph::new();
        assert_eq!(g.live_count(), 1);
        assert!(g.is_empty());
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_graph_ids_are_unique() {
        assert_ne!(Graph::new().id(), Graph::new().id());
    }

    #[test]
    fn test_constants_are_uniqued() {
        let mut g = Graph::new();
        let a = g.constant(Constant::int(5));
        let b = g.constant(Constant::int(5));
        let c = g.constant(Constant::long(5));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_use_chains() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let _add1 = g.add_inferred(Operator::IntOp(ArithOp::Add), &[x, x]);
        let _add2 = g.add_inferred(Operator::IntOp(ArithOp::Add), &[x, x]);
        assert_eq!(g.use_count(x), 4);
        assert_eq!(g.users(x).len(), 2);
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_replace_at_usages() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let y = param(&mut g, 1);
        let add = g.add_inferred(Operator::IntOp(ArithOp::Add), &[x, x]);

        g.replace_at_usages(x, y);

        assert_eq!(g.node(add).inputs(), &[y, y]);
        assert!(g.has_no_usages(x));
        assert_eq!(g.use_count(y), 2);
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_kill_with_unused_floating_inputs() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let neg = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[x]);
        let neg2 = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[neg]);

        g.kill_with_unused_floating_inputs(neg2);

        assert!(!g.is_alive(neg2));
        assert!(!g.is_alive(neg));
        // Parameters are pinned.
        assert!(g.is_alive(x));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_killed_constant_is_recreated() {
        let mut g = Graph::new();
        let c = g.constant(Constant::int(1));
        g.kill(c);
        let again = g.constant(Constant::int(1));
        assert_ne!(c, again);
        assert!(g.is_alive(again));
    }

    #[test]
    #[should_panic(expected = "still has usages")]
    fn test_kill_rejects_used_node() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        g.add_inferred(Operator::IntOp(ArithOp::Neg), &[x]);
        g.kill(x);
    }

    #[test]
    fn test_fixed_replacement_keeps_control_flow() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let state = g.add(Operator::FrameState(0), &[x], Stamp::Void);
        let exact = g.add_inferred(Operator::Exact(ArithOp::AddExact), &[x, x, state]);
        let ret = g.add_inferred(Operator::Control(ControlOp::Return), &[exact]);
        let start = g.start();
        g.set_next(start, exact);
        g.set_next(exact, ret);

        let swapped = g.add_inferred(Operator::Exact(ArithOp::AddExact), &[x, x, state]);
        g.replace_fixed_with_fixed(exact, swapped);

        assert!(!g.is_alive(exact));
        assert_eq!(g.next(start), Some(swapped));
        assert_eq!(g.next(swapped), Some(ret));
        assert_eq!(g.node(ret).inputs(), &[swapped]);
        assert!(g.is_alive(state));
        assert!(g.verify().is_ok());

        g.replace_fixed_with_floating(swapped, x);
        assert_eq!(g.next(start), Some(ret));
        assert_eq!(g.node(ret).inputs(), &[x]);
        // The frame state lost its last user.
        assert!(!g.is_alive(state));
        assert!(g.verify().is_ok());
    }

    #[test]
    fn test_copy_compacts_and_maps() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let dead = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[x]);
        g.kill(dead);
        let neg = g.add_inferred(Operator::IntOp(ArithOp::Neg), &[x]);
        let state = g.add(Operator::FrameState(4), &[neg], Stamp::Void);
        let deopt = g.add_inferred(
            Operator::Deoptimize(DeoptReason::ArithmeticException, DeoptAction::None),
            &[state],
        );
        let start = g.start();
        g.set_next(start, deopt);

        let mut seen = None;
        let copy = g.copy_with(|map| seen = Some(map.clone()));
        let map = seen.unwrap();

        assert_ne!(copy.id(), g.id());
        assert_eq!(copy.live_count(), g.live_count());
        assert_eq!(copy.len(), g.live_count());
        assert!(!map.contains_key(&dead));
        assert_eq!(copy.node(map[&neg]).inputs(), &[map[&x]]);
        assert_eq!(copy.next(copy.start()), Some(map[&deopt]));
        assert_eq!(copy.node(map[&neg]).op, g.node(neg).op);
        assert!(copy.verify().is_ok());
    }

    #[test]
    fn test_epoch_tracks_mutation() {
        let mut g = Graph::new();
        g.mark_canonical();
        assert!(g.is_canonical());
        param(&mut g, 0);
        assert!(!g.is_canonical());
    }

    #[test]
    fn test_verify_reports_stamp_mismatch() {
        let mut g = Graph::new();
        let x = param(&mut g, 0);
        let neg = g.add(Operator::IntOp(ArithOp::Neg), &[x], Stamp::int(64));
        assert_eq!(
            g.verify(),
            Err(GraphError::StampMismatch {
                node: neg,
                stamp: Stamp::int(64),
                expected: Stamp::int(32),
            })
        );
    }
}
