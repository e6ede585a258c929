//! Compilation bailouts.
//!
//! Every recoverable failure of a pass converts into [`CompileError`]; the
//! surrounding compiler abandons the graph and keeps running the code in the
//! lower tier.

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::config::ConfigError;
use crate::ir::graph::GraphError;
use crate::ir::stamp::StampError;
use crate::opt::canonicalize::CanonicalizeError;
use crate::opt::lowering::LoweringError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("canonicalization failed: {0}")]
    Canonicalize(#[from] CanonicalizeError),
    #[error("lowering failed: {0}")]
    Lowering(#[from] LoweringError),
    #[error("malformed graph: {0}")]
    Graph(#[from] GraphError),
    #[error("graph failed verification after '{pass}': {source}")]
    Verification {
        pass: &'static str,
        #[source]
        source: GraphError,
    },
    #[error(transparent)]
    Stamp(#[from] StampError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("code emission failed: {0}")]
    Codegen(#[from] CodegenError),
}

pub type CompileResult<T> = Result<T, CompileError>;
