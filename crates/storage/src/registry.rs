//! Active and pending trace tiers
//!
//! A trace lives in [`TraceRegistry`] while it executes and in
//! [`PendingTraceSink`] between completion and the durable write. It must
//! never be active and stored at once, but may briefly be both pending and
//! stored while the write is acknowledged.

use crate::table::TraceTable;
use std::sync::Arc;
use tierscope_core::{Error, Result, Trace, TraceId};
use tracing::{debug, error};

/// Currently executing traces
///
/// The single source of truth for "what is running right now".
#[derive(Debug, Default)]
pub struct TraceRegistry {
    table: TraceTable,
}

impl TraceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active trace
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateId`] if a trace with the same id is registered. Ids
    /// are random UUIDs, so this indicates a bug and is logged as such.
    pub fn register(&self, trace: Arc<Trace>) -> Result<()> {
        let id = trace.id().clone();
        if self.table.insert_new(trace) {
            Ok(())
        } else {
            error!(trace_id = %id, "trace id already registered");
            Err(Error::DuplicateId(id))
        }
    }

    /// Remove and return an active trace
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if absent. Callers racing with completion treat
    /// this as a no-op.
    pub fn unregister(&self, id: &TraceId) -> Result<Arc<Trace>> {
        self.table.remove(id).ok_or_else(|| {
            debug!(trace_id = %id, "unregister of unknown trace");
            Error::NotFound(id.clone())
        })
    }

    /// Look up an active trace
    pub fn get(&self, id: &TraceId) -> Option<Arc<Trace>> {
        self.table.get(id)
    }

    /// Point-in-time copy of the active traces
    ///
    /// Stale-safe: a trace in the snapshot may complete right after it is
    /// taken.
    pub fn snapshot(&self) -> Vec<Arc<Trace>> {
        self.table.snapshot()
    }

    /// Number of active traces
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if nothing is active
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Completed traces awaiting the durable write
///
/// Without this tier a trace would vanish from every query between leaving
/// the registry and becoming readable from the durable store.
#[derive(Debug, Default)]
pub struct PendingTraceSink {
    table: TraceTable,
}

impl PendingTraceSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a completed trace
    ///
    /// Re-adding an id replaces the held trace.
    pub fn add(&self, trace: Arc<Trace>) {
        if let Some(previous) = self.table.upsert(trace) {
            debug!(trace_id = %previous.id(), "pending trace replaced");
        }
    }

    /// Drop a trace once its durable write is confirmed
    pub fn remove(&self, id: &TraceId) -> Option<Arc<Trace>> {
        self.table.remove(id)
    }

    /// Look up a pending trace
    pub fn get(&self, id: &TraceId) -> Option<Arc<Trace>> {
        self.table.get(id)
    }

    /// Point-in-time copy of the pending traces
    pub fn snapshot(&self) -> Vec<Arc<Trace>> {
        self.table.snapshot()
    }

    /// Number of pending traces
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
