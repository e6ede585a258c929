//! Cached graphs: one read-only graph plus a lazily duplicated mutable copy.
//!
//! A canonical graph reused by many compilations is kept read-only; the
//! first compilation that needs to mutate it gets a duplicate, and every
//! later request returns that same duplicate.
//!
//! [`CachedGraph`] is single-writer: materialization takes `&mut self`, so
//! the borrow checker serializes first access. [`SharedCachedGraph`] is for
//! hosts that need concurrent first access and performs the duplication
//! under a lock exactly once.

use std::sync::Arc;

use parking_lot::Mutex;

use super::graph::{DuplicationMap, Graph};

// =============================================================================
// Single-Writer Cache
// =============================================================================

#[derive(Debug)]
pub struct CachedGraph {
    readonly: Graph,
    mutable: Option<Graph>,
    /// The read-only graph doubles as the mutable copy.
    readonly_is_mutable: bool,
}

impl CachedGraph {
    /// Wrap `graph` without a mutable copy.
    pub fn from_readonly_copy(graph: Graph) -> Self {
        CachedGraph {
            readonly: graph,
            mutable: None,
            readonly_is_mutable: false,
        }
    }

    /// Wrap `graph` as both the read-only and the mutable copy; it will
    /// never be duplicated.
    pub fn from_mutable_copy(graph: Graph) -> Self {
        CachedGraph {
            readonly: graph,
            mutable: None,
            readonly_is_mutable: true,
        }
    }

    /// The original graph. Never duplicates.
    #[inline]
    pub fn readonly_copy(&self) -> &Graph {
        &self.readonly
    }

    pub fn has_mutable_copy(&self) -> bool {
        self.readonly_is_mutable || self.mutable.is_some()
    }

    /// The mutable copy, duplicating the read-only graph on first request.
    ///
    /// `on_duplicate` receives the old-to-new node mapping and is only
    /// called when a duplicate is actually made.
    pub fn get_mutable_copy(&mut self, on_duplicate: impl FnOnce(&DuplicationMap)) -> &mut Graph {
        if self.readonly_is_mutable {
            return &mut self.readonly;
        }
        let readonly = &self.readonly;
        self.mutable.get_or_insert_with(|| {
            let copy = readonly.copy_with(on_duplicate);
            log::debug!("materialized mutable copy {} of graph {}", copy.id(), readonly.id());
            copy
        })
    }
}

// =============================================================================
// Shared Cache
// =============================================================================

/// A cached graph whose mutable copy is materialized exactly once even
/// under concurrent first access.
#[derive(Debug)]
pub struct SharedCachedGraph {
    readonly: Arc<Graph>,
    mutable: Mutex<Option<Arc<Mutex<Graph>>>>,
}

impl SharedCachedGraph {
    pub fn from_readonly_copy(graph: Graph) -> Self {
        SharedCachedGraph {
            readonly: Arc::new(graph),
            mutable: Mutex::new(None),
        }
    }

    pub fn readonly_copy(&self) -> &Arc<Graph> {
        &self.readonly
    }

    pub fn has_mutable_copy(&self) -> bool {
        self.mutable.lock().is_some()
    }

    /// The mutable copy, duplicating on first request. Callers racing on the
    /// first request all receive the copy made by the winner; only the
    /// winner's `on_duplicate` runs.
    pub fn get_mutable_copy(
        &self,
        on_duplicate: impl FnOnce(&DuplicationMap),
    ) -> Arc<Mutex<Graph>> {
        let mut slot = self.mutable.lock();
        let copy = slot.get_or_insert_with(|| {
            let copy = self.readonly.copy_with(on_duplicate);
            log::debug!(
                "materialized shared mutable copy {} of graph {}",
                copy.id(),
                self.readonly.id()
            );
            Arc::new(Mutex::new(copy))
        });
        Arc::clone(copy)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::GraphBuilder;
    use crate::ir::stamp::Stamp;
    use std::cell::Cell;

    fn sample() -> Graph {
        let mut b = GraphBuilder::new();
        let x = b.parameter(0, Stamp::int(32));
        let neg = b.negate(x);
        b.ret(neg);
        b.finish()
    }

    #[test]
    fn test_mutable_copy_is_made_once() {
        let graph = sample();
        let original = graph.id();
        let mut cache = CachedGraph::from_readonly_copy(graph);
        assert!(!cache.has_mutable_copy());

        let calls = Cell::new(0);
        let first = cache
            .get_mutable_copy(|map| {
                calls.set(calls.get() + 1);
                assert!(!map.is_empty());
            })
            .id();
        assert_ne!(first, original);

        let second = cache.get_mutable_copy(|_| panic!("duplicated twice")).id();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.readonly_copy().id(), original);
    }

    #[test]
    fn test_mutating_the_copy_leaves_readonly_alone() {
        let mut cache = CachedGraph::from_readonly_copy(sample());
        let before = cache.readonly_copy().live_count();

        let copy = cache.get_mutable_copy(|_| {});
        let start = copy.start();
        let ret = copy.next(start).unwrap();
        copy.remove_fixed(ret);
        copy.kill_with_unused_floating_inputs(ret);

        assert_eq!(cache.readonly_copy().live_count(), before);
        assert!(cache.readonly_copy().verify().is_ok());
    }

    #[test]
    fn test_from_mutable_copy_never_duplicates() {
        let graph = sample();
        let id = graph.id();
        let mut cache = CachedGraph::from_mutable_copy(graph);
        assert!(cache.has_mutable_copy());
        assert_eq!(cache.readonly_copy().id(), id);
        assert_eq!(cache.get_mutable_copy(|_| panic!("duplicated")).id(), id);
    }

    #[test]
    fn test_shared_cache_duplicates_once_across_threads() {
        let cache = Arc::new(SharedCachedGraph::from_readonly_copy(sample()));
        let calls = Arc::new(Mutex::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    let copy = cache.get_mutable_copy(|_| *calls.lock() += 1);
                    let id = copy.lock().id();
                    id
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(*calls.lock(), 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_ne!(ids[0], cache.readonly_copy().id());
    }
}
