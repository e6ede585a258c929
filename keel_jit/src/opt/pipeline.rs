//! Optimization Pipeline.
//!
//! Runs the passes over a graph in phase order with per-pass statistics.
//!
//! # Pass Phases
//!
//! 1. **Canonicalization**: peephole rewriting and stamp inference to a fixpoint
//! 2. **Lowering**: exact arithmetic to explicit overflow branches
//!
//! Lowering consumes the canonical form, so it always runs last. Passes of
//! the canonicalization phase are repeated until none of them changes the
//! graph; lowering runs once.

use std::time::{Duration, Instant};

use super::OptimizationPass;
use super::canonicalize::Canonicalizer;
use super::lowering::ExactArithmeticLowering;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::ir::graph::Graph;

/// Upper bound on repetitions of the canonicalization phase.
const MAX_PHASE_ITERATIONS: usize = 4;

// =============================================================================
// Pass Phase
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PassPhase {
    Canonicalization,
    Lowering,
}

impl PassPhase {
    const ALL: [PassPhase; 2] = [PassPhase::Canonicalization, PassPhase::Lowering];

    /// Whether the phase is repeated until nothing changes.
    fn iterates(self) -> bool {
        self == PassPhase::Canonicalization
    }
}

// =============================================================================
// Pass Entry
// =============================================================================

struct PassEntry {
    pass: Box<dyn OptimizationPass>,
    phase: PassPhase,
    runs: usize,
    changes: usize,
    time: Duration,
}

impl PassEntry {
    fn new<P: OptimizationPass + 'static>(pass: P, phase: PassPhase) -> Self {
        Self {
            pass: Box::new(pass),
            phase,
            runs: 0,
            changes: 0,
            time: Duration::ZERO,
        }
    }
}

// =============================================================================
// Optimization Pipeline
// =============================================================================

pub struct OptPipeline {
    config: CompilerConfig,
    passes: Vec<PassEntry>,
    total_time: Duration,
}

impl OptPipeline {
    /// A pipeline with the default configuration.
    pub fn new() -> Self {
        Self::with_config(CompilerConfig::default())
    }

    /// A pipeline running the passes `config` enables.
    pub fn with_config(config: CompilerConfig) -> Self {
        let mut pipeline = Self {
            config,
            passes: Vec::new(),
            total_time: Duration::ZERO,
        };
        pipeline.register_default_passes();
        pipeline
    }

    fn register_default_passes(&mut self) {
        if self.config.canonicalize {
            let canonicalizer = Canonicalizer::with_config(&self.config);
            self.register(canonicalizer, PassPhase::Canonicalization);
        }
        if self.config.lower_exact_arithmetic {
            self.register(ExactArithmeticLowering::new(), PassPhase::Lowering);
        }
    }

    /// Register an additional pass.
    pub fn register<P: OptimizationPass + 'static>(&mut self, pass: P, phase: PassPhase) {
        self.passes.push(PassEntry::new(pass, phase));
    }

    /// Run every phase over `graph`.
    ///
    /// The first failing pass aborts compilation of the graph.
    pub fn run(&mut self, graph: &mut Graph) -> CompileResult<PipelineStats> {
        let start = Instant::now();
        let mut stats = PipelineStats {
            initial_size: graph.live_count(),
            ..Default::default()
        };

        for phase in PassPhase::ALL {
            let iterations = if phase.iterates() { MAX_PHASE_ITERATIONS } else { 1 };
            for _ in 0..iterations {
                stats.total_iterations += 1;
                if !self.run_phase(graph, phase)? {
                    break;
                }
            }
            stats.phases_run += 1;
        }

        self.total_time = start.elapsed();
        stats.total_time = self.total_time;
        stats.final_size = graph.live_count();
        log::debug!(
            "pipeline on graph {}: {} -> {} nodes in {} iterations",
            graph.id(),
            stats.initial_size,
            stats.final_size,
            stats.total_iterations
        );
        Ok(stats)
    }

    /// Run the passes of `phase` once each. Returns whether any changed the
    /// graph.
    fn run_phase(&mut self, graph: &mut Graph, phase: PassPhase) -> CompileResult<bool> {
        let mut changed = false;

        for entry in self.passes.iter_mut().filter(|e| e.phase == phase) {
            let start = self.config.collect_timing.then(Instant::now);

            let pass_changed = entry.pass.run(graph)?;

            if let Some(start) = start {
                entry.time += start.elapsed();
            }
            entry.runs += 1;
            if pass_changed {
                entry.changes += 1;
                changed = true;
            }

            if self.config.verify_graph {
                graph.verify().map_err(|source| CompileError::Verification {
                    pass: entry.pass.name(),
                    source,
                })?;
            }
        }

        Ok(changed)
    }

    pub fn pass_stats(&self) -> Vec<PassStat> {
        self.passes
            .iter()
            .map(|e| PassStat {
                name: e.pass.name(),
                phase: e.phase,
                runs: e.runs,
                changes: e.changes,
                time: e.time,
            })
            .collect()
    }

    #[inline]
    pub fn total_time(&self) -> Duration {
        self.total_time
    }
}

impl Default for OptPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Clone)]
pub struct PassStat {
    pub name: &'static str,
    pub phase: PassPhase,
    /// Number of times run.
    pub runs: usize,
    /// Number of runs that changed the graph.
    pub changes: usize,
    /// Zero unless timing collection is enabled.
    pub time: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_iterations: usize,
    pub phases_run: usize,
    pub total_time: Duration,
    /// Live nodes before the pipeline ran.
    pub initial_size: usize,
    /// Live nodes afterwards.
    pub final_size: usize,
}

impl PipelineStats {
    /// Final size relative to the initial size.
    pub fn size_reduction(&self) -> f64 {
        if self.initial_size == 0 {
            1.0
        } else {
            self.final_size as f64 / self.initial_size as f64
        }
    }
}

/// Run the default pipeline on a graph.
pub fn optimize(graph: &mut Graph) -> CompileResult<PipelineStats> {
    OptPipeline::new().run(graph)
}

// =============================================================================
// Tests
// =============================================================================
