//! Sea-of-Nodes IR core for an optimizing JIT tier.
//!
//! - Integer stamps: a sound range-and-bits lattice for every value
//! - Canonicalization: peephole rewriting and stamp inference to a fixpoint
//! - Exact-arithmetic lowering: overflow checks become explicit branches
//!   to deoptimization
//! - Cached graphs shared read-only between compilations
#![deny(unsafe_op_in_unsafe_fn)]
pub mod codegen;
pub mod config;
pub mod error;
pub mod ir;
pub mod opt;
pub mod replacements;

pub use config::{CompilerConfig, ConfigError};
pub use error::{CompileError, CompileResult};
pub use ir::{Graph, GraphBuilder, IntegerStamp, NodeId, Stamp};
pub use opt::canonicalize::Canonicalizer;
pub use opt::lowering::ExactArithmeticLowering;
pub use opt::pipeline::{OptPipeline, optimize};
