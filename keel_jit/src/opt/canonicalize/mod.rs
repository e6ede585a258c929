//! Worklist-driven canonicalization.
//!
//! Every node with a stamp or canonicalization capability is visited until
//! nothing changes:
//!
//! 1. Re-infer its stamp from its inputs and intersect it with the current
//!    one. If it narrowed, its users are queued.
//! 2. Ask it for its canonical form. If that differs, materialize the
//!    replacement, move all usages over, kill the old node, and queue the
//!    replacement and its users.
//!
//! Floating nodes left without usages are removed along the way.
//!
//! # Termination
//!
//! Every rewrite strictly decreases, lexicographically:
//!
//! 1. the number of negate nodes (only negate rules remove them, no rule
//!    creates one),
//! 2. the number of non-constant nodes (folding, identities),
//! 3. the number of commutative nodes with a constant first operand
//!    (the swap rule, which never fires when both operands are constant).
//!
//! A rewrite budget proportional to the graph size guards against rule
//! bugs regardless.

mod tool;
mod worklist;

pub use tool::GraphCanonicalizerTool;
pub use worklist::Worklist;

use thiserror::Error;

use super::OptimizationPass;
use crate::config::CompilerConfig;
use crate::error::CompileResult;
use crate::ir::graph::{Graph, GraphId, GraphStage};
use crate::ir::node::{NodeFlags, NodeId};
use crate::ir::nodes::{Canonical, CanonicalizerTool};
use crate::ir::stamp::StampError;

// =============================================================================
// Errors & Statistics
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error("graph {0} has exact arithmetic lowered and can no longer be canonicalized")]
    AlreadyLowered(GraphId),
    #[error("rewrite budget of {budget} exhausted on graph {graph}")]
    RewriteBudgetExhausted { graph: GraphId, budget: usize },
    #[error(transparent)]
    Stamp(#[from] StampError),
}

/// Counters for one canonicalization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalizerStats {
    /// Nodes popped from the worklist.
    pub visits: usize,
    /// Nodes replaced by their canonical form.
    pub rewrites: usize,
    /// Stamps narrowed by re-inference.
    pub stamps_narrowed: usize,
    /// Floating nodes removed for lack of usages.
    pub dead_nodes_removed: usize,
}

impl CanonicalizerStats {
    pub fn changed(&self) -> bool {
        self.rewrites + self.stamps_narrowed + self.dead_nodes_removed > 0
    }
}

// =============================================================================
// Canonicalizer
// =============================================================================

pub struct Canonicalizer {
    tool: GraphCanonicalizerTool,
    config: CompilerConfig,
    stats: CanonicalizerStats,
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::with_config(&CompilerConfig::default())
    }

    pub fn with_config(config: &CompilerConfig) -> Self {
        Canonicalizer {
            tool: GraphCanonicalizerTool::new(),
            config: config.clone(),
            stats: CanonicalizerStats::default(),
        }
    }

    pub fn with_tool(mut self, tool: GraphCanonicalizerTool) -> Self {
        self.tool = tool;
        self
    }

    /// Statistics of the most recent run.
    pub fn stats(&self) -> CanonicalizerStats {
        self.stats
    }

    /// Canonicalize `graph` to its fixpoint.
    pub fn apply(&mut self, graph: &mut Graph) -> Result<CanonicalizerStats, CanonicalizeError> {
        let initial: Vec<NodeId> = graph
            .iter()
            .filter(|(_, n)| {
                n.op.as_canonicalizable().is_some() || n.op.as_stamp_inferable().is_some()
            })
            .map(|(id, _)| id)
            .collect();
        self.apply_to(graph, initial)
    }

    /// Canonicalize starting from `nodes`, following changes wherever they
    /// propagate.
    pub fn apply_to(
        &mut self,
        graph: &mut Graph,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<CanonicalizerStats, CanonicalizeError> {
        if graph.stage() >= GraphStage::ExactArithmeticLowered {
            return Err(CanonicalizeError::AlreadyLowered(graph.id()));
        }
        self.stats = CanonicalizerStats::default();

        let budget = self.config.rewrite_budget(graph.live_count());

        let mut worklist = Worklist::with_capacity(graph.len());
        worklist.extend(nodes);

        while let Some(node) = worklist.pop() {
            if !graph.is_alive(node) {
                continue;
            }
            self.stats.visits += 1;

            if self.remove_if_unused(graph, node) {
                continue;
            }

            if self.infer_stamp(graph, node)? {
                worklist.extend(graph.users(node));
            }

            let Some(canonicalizable) = graph.node(node).op.as_canonicalizable() else {
                continue;
            };
            let canonical = canonicalizable.canonical(&self.tool, graph, node);
            if canonical == Canonical::Unchanged {
                continue;
            }

            self.stats.rewrites += 1;
            if self.stats.rewrites > budget {
                log::warn!(
                    "canonicalization of graph {} exceeded {budget} rewrites",
                    graph.id()
                );
                return Err(CanonicalizeError::RewriteBudgetExhausted {
                    graph: graph.id(),
                    budget,
                });
            }
            self.replace(graph, &mut worklist, node, canonical)?;
        }

        graph.mark_canonical();
        log::debug!(
            "canonicalized graph {}: {} visits, {} rewrites, {} stamps narrowed, {} dead",
            graph.id(),
            self.stats.visits,
            self.stats.rewrites,
            self.stats.stamps_narrowed,
            self.stats.dead_nodes_removed
        );
        Ok(self.stats)
    }

    /// Kill a floating, unpinned node nobody uses.
    fn remove_if_unused(&mut self, graph: &mut Graph, node: NodeId) -> bool {
        let n = graph.node(node);
        if !self.tool.all_usages_available()
            || n.is_fixed()
            || n.flags.contains(NodeFlags::PINNED)
            || !graph.has_no_usages(node)
        {
            return false;
        }
        log::trace!("removing unused {node} ({})", n.op);
        let before = graph.live_count();
        graph.kill_with_unused_floating_inputs(node);
        self.stats.dead_nodes_removed += before - graph.live_count();
        true
    }

    /// Intersect the stamp of `node` with the one its inputs imply.
    fn infer_stamp(&mut self, graph: &mut Graph, node: NodeId) -> Result<bool, StampError> {
        let n = graph.node(node);
        if n.op.as_stamp_inferable().is_none() {
            return Ok(false);
        }
        let Some(inferred) = graph.infer_stamp(&n.op, n.inputs()) else {
            return Ok(false);
        };
        let current = *n.stamp();
        let Some(joined) = current.join(&inferred) else {
            log::trace!("{node}: inferred {inferred} is disjoint from {current}; keeping");
            return Ok(false);
        };
        let changed = graph.narrow_stamp(node, joined)?;
        if changed {
            log::trace!("{node}: stamp {current} -> {joined}");
            self.stats.stamps_narrowed += 1;
        }
        Ok(changed)
    }

    /// Materialize `canonical` and substitute it for `node`.
    fn replace(
        &mut self,
        graph: &mut Graph,
        worklist: &mut Worklist,
        node: NodeId,
        canonical: Canonical,
    ) -> Result<(), StampError> {
        let created = matches!(canonical, Canonical::New(_));
        let replacement = match canonical {
            Canonical::Unchanged => return Ok(()),
            Canonical::Existing(id) => id,
            Canonical::Constant(c) => graph.constant(c),
            Canonical::New(template) => graph.add_inferred(template.op, &template.inputs),
        };
        if replacement == node {
            return Ok(());
        }
        log::trace!(
            "{node} ({}) -> {replacement} ({})",
            graph.node(node).op,
            graph.node(replacement).op
        );

        // Both compute the same value, so the replacement may keep whatever
        // the old node knew.
        let joined = graph.stamp(replacement).join(graph.stamp(node));
        if let Some(joined) = joined
            && graph.narrow_stamp(replacement, joined)?
        {
            self.stats.stamps_narrowed += 1;
        }

        if graph.node(node).is_fixed() {
            if created && graph.node(replacement).is_fixed() {
                graph.replace_fixed_with_fixed(node, replacement);
            } else {
                graph.replace_fixed_with_floating(node, replacement);
            }
        } else {
            graph.replace_at_usages(node, replacement);
            graph.kill_with_unused_floating_inputs(node);
        }

        worklist.push(replacement);
        worklist.extend(graph.users(replacement));
        Ok(())
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationPass for Canonicalizer {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn run(&mut self, graph: &mut Graph) -> CompileResult<bool> {
        Ok(self.apply(graph)?.changed())
    }
}

// =============================================================================
// Tests
// =============================================================================
