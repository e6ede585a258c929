//! Method substitutions.
//!
//! A front end that reaches a call to a known library method can ask the
//! [`SubstitutionTable`] for a recipe and emit IR nodes in place of the call.
//! The built-in recipes map `java/lang/Math.addExact` to an exact add whose
//! frame state resumes at the call site.

use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ir::builder::GraphBuilder;
use crate::ir::node::NodeId;

// =============================================================================
// Method Signature
// =============================================================================

/// A method identified the way class files name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    /// Internal class name, e.g. `java/lang/Math`.
    pub holder: String,
    pub name: String,
    /// Method descriptor, e.g. `(II)I`.
    pub descriptor: String,
}

impl MethodSignature {
    pub fn new(holder: &str, name: &str, descriptor: &str) -> Self {
        MethodSignature {
            holder: holder.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.holder, self.name, self.descriptor)
    }
}

// =============================================================================
// Substitutions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstitutionError {
    #[error("{method} takes {expected} arguments, got {found}")]
    ArgumentCount {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("argument {index} of {method} should be i{expected}, is {found}")]
    ArgumentStamp {
        method: String,
        index: usize,
        expected: u32,
        found: String,
    },
}

/// Emits the replacement for a call at bytecode index `bci` with the
/// given argument nodes. Returns the node producing the call's result.
pub type SubstitutionFn =
    fn(&mut GraphBuilder, &[NodeId], u32) -> Result<NodeId, SubstitutionError>;

#[derive(Clone, Copy)]
pub struct Substitution {
    /// Integer width of every argument and of the result.
    pub bits: u32,
    pub arity: usize,
    pub emit: SubstitutionFn,
}

impl fmt::Debug for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitution")
            .field("bits", &self.bits)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct SubstitutionTable {
    entries: FxHashMap<MethodSignature, Substitution>,
}

impl SubstitutionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding the built-in substitutions.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register(
            MethodSignature::new("java/lang/Math", "addExact", "(II)I"),
            Substitution { bits: 32, arity: 2, emit: emit_add_exact },
        );
        table.register(
            MethodSignature::new("java/lang/Math", "addExact", "(JJ)J"),
            Substitution { bits: 64, arity: 2, emit: emit_add_exact },
        );
        table
    }

    /// Register a substitution, replacing any previous one for `method`.
    pub fn register(&mut self, method: MethodSignature, substitution: Substitution) {
        self.entries.insert(method, substitution);
    }

    pub fn lookup(&self, method: &MethodSignature) -> Option<&Substitution> {
        self.entries.get(method)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Emit the substitution for `method` if there is one. `Ok(None)` means
    /// the call must be compiled as a call.
    pub fn apply(
        &self,
        method: &MethodSignature,
        builder: &mut GraphBuilder,
        args: &[NodeId],
        bci: u32,
    ) -> Result<Option<NodeId>, SubstitutionError> {
        let Some(substitution) = self.lookup(method) else {
            return Ok(None);
        };
        check_arguments(method, substitution, builder, args)?;
        let result = (substitution.emit)(builder, args, bci)?;
        log::trace!("substituted {method} at bci {bci} with {result}");
        Ok(Some(result))
    }
}

fn check_arguments(
    method: &MethodSignature,
    substitution: &Substitution,
    builder: &GraphBuilder,
    args: &[NodeId],
) -> Result<(), SubstitutionError> {
    if args.len() != substitution.arity {
        return Err(SubstitutionError::ArgumentCount {
            method: method.to_string(),
            expected: substitution.arity,
            found: args.len(),
        });
    }
    for (index, &arg) in args.iter().enumerate() {
        let stamp = builder.graph().stamp(arg);
        if stamp.as_integer().map(|s| s.bits()) != Some(substitution.bits) {
            return Err(SubstitutionError::ArgumentStamp {
                method: method.to_string(),
                index,
                expected: substitution.bits,
                found: stamp.to_string(),
            });
        }
    }
    Ok(())
}

fn emit_add_exact(
    builder: &mut GraphBuilder,
    args: &[NodeId],
    bci: u32,
) -> Result<NodeId, SubstitutionError> {
    Ok(builder.add_exact(args[0], args[1], bci))
}
