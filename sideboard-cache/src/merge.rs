//! Multi-source result merging.
//!
//! A logical collection can be assembled from several sources of
//! differing quality. Each source carries a fixed [`SourceRank`];
//! merging unions the batches and dedupes by a stable identity,
//! keeping the highest-priority source's version of each item.
//!
//! Sub-fetches complete independently and in any order, so callers
//! hand their batches to a [`MergeCollector`], which fires a single
//! completion callback once every expected source has reported. A
//! failed sub-source reports an empty batch rather than blocking the
//! merge.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ============================================================================
// Ranked batches
// ============================================================================

/// Fixed source priority; lower ranks win conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRank(pub u8);

/// Items produced by one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch<T> {
    pub rank: SourceRank,
    pub items: Vec<T>,
}

impl<T> SourceBatch<T> {
    pub fn new(rank: SourceRank, items: Vec<T>) -> Self {
        Self { rank, items }
    }

    /// The batch a failed sub-source reports.
    pub fn empty(rank: SourceRank) -> Self {
        Self {
            rank,
            items: Vec::new(),
        }
    }
}

/// Union `batches` in priority order, keeping the first occurrence of
/// each identity.
///
/// Within a source, earlier items win over later duplicates; order of
/// the surviving items follows the priority-sorted traversal. Ties in
/// rank resolve in the order the batches were supplied.
pub fn merge_by_identity<T, K, F>(mut batches: Vec<SourceBatch<T>>, mut identity: F) -> Vec<T>
where
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    batches.sort_by_key(|batch| batch.rank);

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for batch in batches {
        for item in batch.items {
            if seen.insert(identity(&item)) {
                merged.push(item);
            }
        }
    }
    merged
}

// ============================================================================
// Collector
// ============================================================================

struct CollectorState<T> {
    expected: usize,
    batches: Vec<SourceBatch<T>>,
    on_complete: Option<Box<dyn FnOnce(Vec<SourceBatch<T>>) + Send>>,
}

/// Gathers one batch per sub-source and fires a single completion.
///
/// Cloneable so each sub-fetch callback can own a handle; the
/// completion callback runs on whichever thread submits the final
/// batch, exactly once.
pub struct MergeCollector<T> {
    state: Arc<Mutex<CollectorState<T>>>,
}

impl<T> Clone for MergeCollector<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> MergeCollector<T> {
    /// Expect `expected` batches, then hand them all to `on_complete`.
    pub fn new<F>(expected: usize, on_complete: F) -> Self
    where
        F: FnOnce(Vec<SourceBatch<T>>) + Send + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(CollectorState {
                expected,
                batches: Vec::with_capacity(expected),
                on_complete: Some(Box::new(on_complete)),
            })),
        }
    }

    /// Record one sub-source's batch; a failed source submits
    /// [`SourceBatch::empty`]. Batches beyond the expected count are
    /// ignored.
    pub fn submit(&self, batch: SourceBatch<T>) {
        let finished = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if state.on_complete.is_none() {
                debug!("merge collector already completed; dropping batch");
                return;
            }
            state.batches.push(batch);
            if state.batches.len() >= state.expected {
                let batches = std::mem::take(&mut state.batches);
                state.on_complete.take().map(|cb| (cb, batches))
            } else {
                None
            }
        };
        if let Some((on_complete, batches)) = finished {
            on_complete(batches);
        }
    }

    /// Batches still owed before completion fires.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.expected.saturating_sub(state.batches.len())
    }
}
