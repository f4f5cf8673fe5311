//! Completion pipeline
//!
//! Moves a finished trace from the active tier through the pending tier
//! into the durable store:
//!
//! ```text
//! on_complete(trace):
//!   if !should_store: unregister, drop
//!   pending.add(trace)          ─┐ visible to queries throughout
//!   registry.unregister(id)      │
//!   writer.submit(snapshot)     ─┘ writer removes from pending once stored
//! ```
//!
//! The trace is added to the pending tier before it leaves the registry, so
//! a concurrent query that misses it in its active snapshot still finds it
//! when it reads pending afterwards. The snapshot is only submitted after
//! the trace left the registry, so it is never active and stored at once.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tierscope_core::{Clock, ConfigService, Ticker, Trace};
use tierscope_durability::{StoredTrace, TraceWriter};
use tierscope_storage::{PendingTraceSink, TraceRegistry};
use tracing::{debug, info, warn};

/// Decides which traces are persisted and hands them to the writer
#[derive(Debug)]
pub struct TraceCollector {
    registry: Arc<TraceRegistry>,
    pending: Arc<PendingTraceSink>,
    writer: Arc<TraceWriter>,
    config: Arc<ConfigService>,
    clock: Arc<dyn Clock>,
    ticker: Arc<dyn Ticker>,
    // orders partial (stuck) snapshots against the final one
    submit_lock: Mutex<()>,
    stored: AtomicU64,
    discarded: AtomicU64,
}

impl TraceCollector {
    /// Create a collector over the given tiers
    pub fn new(
        registry: Arc<TraceRegistry>,
        pending: Arc<PendingTraceSink>,
        writer: Arc<TraceWriter>,
        config: Arc<ConfigService>,
        clock: Arc<dyn Clock>,
        ticker: Arc<dyn Ticker>,
    ) -> Self {
        Self {
            registry,
            pending,
            writer,
            config,
            clock,
            ticker,
            submit_lock: Mutex::new(()),
            stored: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Whether `trace` qualifies for persistence as of `tick`
    ///
    /// Stuck, errored and fine-profiled traces always qualify; anything else
    /// must have run at least the store threshold.
    pub fn should_store(&self, trace: &Trace, tick: u64) -> bool {
        trace.is_stuck()
            || trace.is_error()
            || trace.is_fine()
            || trace.duration_as_of(tick) >= self.config.get().store_threshold_nanos()
    }

    /// Retire a completed trace
    ///
    /// Returns whether the trace was queued for persistence. A trace that is
    /// no longer registered (already retired by another caller) is ignored.
    pub fn on_complete(&self, trace: &Arc<Trace>) -> bool {
        let tick = self.ticker.read();
        if !self.should_store(trace, tick) {
            if self.registry.unregister(trace.id()).is_ok() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(trace_id = %trace.id(), "trace below store threshold discarded");
            }
            return false;
        }

        if self.registry.get(trace.id()).is_none() {
            debug!(trace_id = %trace.id(), "completion of unregistered trace ignored");
            return false;
        }
        self.pending.add(Arc::clone(trace));
        if self.registry.unregister(trace.id()).is_err() {
            // lost a race with another retirement; its snapshot wins
            self.pending.remove(trace.id());
            return false;
        }

        let _guard = self.submit_lock.lock();
        let snapshot = StoredTrace::capture(trace, self.clock.current_time_millis(), tick);
        if self.writer.submit(snapshot) {
            self.stored.fetch_add(1, Ordering::Relaxed);
            debug!(trace_id = %trace.id(), duration = trace.duration_as_of(tick), "trace queued for storage");
            true
        } else {
            warn!(trace_id = %trace.id(), "writer stopped; trace left in pending tier");
            false
        }
    }

    /// Persist a partial snapshot of a trace that has been running too long
    ///
    /// The snapshot is stored with `completed == false`; queries keep showing
    /// the trace as active until it completes and its final snapshot
    /// replaces this one.
    pub fn on_stuck(&self, trace: &Arc<Trace>) -> bool {
        let _guard = self.submit_lock.lock();
        if trace.is_completed() {
            return false;
        }
        let tick = self.ticker.read();
        let snapshot = StoredTrace::capture(trace, self.clock.current_time_millis(), tick);
        info!(
            trace_id = %trace.id(),
            headline = %snapshot.headline,
            elapsed_nanos = snapshot.duration,
            "stuck trace"
        );
        self.writer.submit(snapshot)
    }

    /// Number of traces queued for storage
    pub fn stored_count(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Number of completed traces discarded below the store threshold
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}
