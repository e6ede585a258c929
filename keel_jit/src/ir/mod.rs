//! Sea-of-Nodes Intermediate Representation.
//!
//! # Core Components
//!
//! - **Arena** (`arena.rs`): index-addressed node storage and side tables
//! - **Stamps** (`stamp.rs`): the integer value lattice
//! - **Constants** (`constant.rs`) and the **arithmetic table** (`arith.rs`)
//! - **Operators** (`operators.rs`) and **nodes** (`node.rs`)
//! - **Node kinds** (`nodes/`): per-kind stamp inference, canonicalization,
//!   lowering and code emission
//! - **Graph** (`graph.rs`): use lists, control links, rewiring, duplication
//! - **Builder** (`builder.rs`): straight-line graph construction
//! - **Cache** (`cache.rs`): read-only graphs with a lazily made mutable copy

pub mod arena;
pub mod arith;
pub mod builder;
pub mod cache;
pub mod constant;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod operators;
pub mod stamp;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use arith::{ArithOp, ArithmeticOverflow};
pub use builder::GraphBuilder;
pub use cache::{CachedGraph, SharedCachedGraph};
pub use constant::Constant;
pub use graph::{DuplicationMap, Graph, GraphError, GraphId, GraphStage};
pub use node::{Node, NodeFlags, NodeId};
pub use operators::{ControlOp, DeoptAction, DeoptReason, Operator, OverflowCondition};
pub use stamp::{IntegerStamp, Stamp, StampError};
