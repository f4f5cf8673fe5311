//! Sharded trace table
//!
//! DashMap keyed by [`TraceId`], FxHash within each shard.
//!
//! # Design
//!
//! - DashMap: sharded, each shard behind its own RwLock
//! - FxHash: fast non-crypto hash for string ids
//! - Values are `Arc<Trace>` so a snapshot copies pointers, not traces
//!
//! # Performance Targets
//!
//! - insert/remove: only locks the target shard
//! - snapshot: one shard read-locked at a time, O(n) pointer copies

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tierscope_core::{Trace, TraceId};

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Sharded map of traces by id
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - get(): read-locks one shard
/// - insert/remove: write-locks one shard
/// - snapshot(): read-locks each shard in turn while copying it
///
/// A snapshot is not atomic across shards. A trace inserted or removed while
/// a snapshot is in progress may or may not appear in it; callers that need
/// a consistent cross-tier view deduplicate by id afterwards.
pub struct TraceTable {
    traces: DashMap<TraceId, Arc<Trace>, FxBuildHasher>,
    /// Incremented on every successful mutation
    version: AtomicU64,
}

impl TraceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            traces: DashMap::with_hasher(FxBuildHasher::default()),
            version: AtomicU64::new(0),
        }
    }

    /// Create with expected number of traces
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            traces: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
            version: AtomicU64::new(0),
        }
    }

    /// Number of successful mutations so far
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Insert only if the id is absent
    ///
    /// Returns false, leaving the existing trace in place, if the id is taken.
    pub fn insert_new(&self, trace: Arc<Trace>) -> bool {
        match self.traces.entry(trace.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(trace);
                self.version.fetch_add(1, Ordering::AcqRel);
                true
            }
        }
    }

    /// Insert or replace
    ///
    /// Returns the replaced trace, if any.
    pub fn upsert(&self, trace: Arc<Trace>) -> Option<Arc<Trace>> {
        let previous = self.traces.insert(trace.id().clone(), trace);
        self.version.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Remove by id
    pub fn remove(&self, id: &TraceId) -> Option<Arc<Trace>> {
        let removed = self.traces.remove(id).map(|(_, trace)| trace);
        if removed.is_some() {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Look up by id
    #[inline]
    pub fn get(&self, id: &TraceId) -> Option<Arc<Trace>> {
        self.traces.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if an id is present
    #[inline]
    pub fn contains(&self, id: &TraceId) -> bool {
        self.traces.contains_key(id)
    }

    /// Number of traces
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Point-in-time copy of the traces
    ///
    /// Order is unspecified.
    pub fn snapshot(&self) -> Vec<Arc<Trace>> {
        self.traces
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for TraceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TraceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceTable")
            .field("len", &self.len())
            .field("version", &self.version())
            .finish()
    }
}
