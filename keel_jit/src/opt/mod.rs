//! Optimization passes over the graph.
//!
//! - [`canonicalize`]: worklist-driven peephole rewriting to a fixpoint
//! - [`lowering`]: exact arithmetic to explicit overflow branches
//! - [`pipeline`]: runs the passes in order, lowering last

pub mod canonicalize;
pub mod lowering;
pub mod pipeline;

use crate::error::CompileResult;
use crate::ir::graph::Graph;

/// A transformation over a whole graph.
pub trait OptimizationPass {
    fn name(&self) -> &'static str;

    /// Run the pass. Returns whether the graph changed.
    fn run(&mut self, graph: &mut Graph) -> CompileResult<bool>;
}
