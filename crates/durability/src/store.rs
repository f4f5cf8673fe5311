//! Durable trace store contract and in-memory implementation

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tierscope_core::{
    Entry, Error, MetricSnapshot, ProfileSample, Result, SummaryQuery, Trace, TraceId,
    TraceSummary,
};

/// Persisted form of a trace
///
/// A stuck trace is persisted before it finishes (`completed == false`) and
/// persisted again, replacing the first row, once it completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTrace {
    /// Trace id
    pub id: TraceId,
    /// Wall-clock time the snapshot was taken, ms
    pub captured_at: i64,
    /// Wall-clock start, ms
    pub start_time: i64,
    /// Duration in nanoseconds as of capture
    pub duration: u64,
    /// Whether the trace had finished at capture
    pub completed: bool,
    /// Background flag
    pub background: bool,
    /// Error flag
    pub error: bool,
    /// Error message, if any
    pub error_message: Option<String>,
    /// Fine-profiled flag
    pub fine: bool,
    /// Stuck flag
    pub stuck: bool,
    /// User id, if any
    pub user_id: Option<String>,
    /// Root entry message
    pub headline: String,
    /// Span entries
    pub entries: Vec<Entry>,
    /// Metric values
    pub metrics: Vec<MetricSnapshot>,
    /// Coarse profile samples
    pub coarse_samples: Vec<ProfileSample>,
    /// Fine profile samples
    pub fine_samples: Vec<ProfileSample>,
}

impl StoredTrace {
    /// Snapshot a trace
    ///
    /// `capture_tick` is only used for traces that have not completed.
    pub fn capture(trace: &Trace, captured_at: i64, capture_tick: u64) -> Self {
        Self {
            id: trace.id().clone(),
            captured_at,
            start_time: trace.start_time(),
            duration: trace.duration_as_of(capture_tick),
            completed: trace.is_completed(),
            background: trace.is_background(),
            error: trace.is_error(),
            error_message: trace.error_message(),
            fine: trace.is_fine(),
            stuck: trace.is_stuck(),
            user_id: trace.user_id(),
            headline: trace.headline(),
            entries: trace.entries(),
            metrics: trace.metrics(),
            coarse_samples: trace.coarse_samples(),
            fine_samples: trace.fine_samples(),
        }
    }

    /// Summary projection
    pub fn summary(&self) -> TraceSummary {
        TraceSummary::new(self.id.clone(), self.captured_at, self.duration, self.completed)
    }

    fn matches(&self, query: &SummaryQuery) -> bool {
        query.matches_captured_at(self.captured_at)
            && query.criteria.matches(
                self.duration,
                self.background,
                self.error,
                self.fine,
                self.user_id.as_deref(),
            )
    }
}

/// Durable tier of traces
///
/// Implementations are shared between the writer thread and query threads.
pub trait DurableTraceStore: Send + Sync + std::fmt::Debug {
    /// Persist a trace, replacing any row with the same id
    fn write(&self, trace: StoredTrace) -> Result<()>;

    /// Summaries matching `query`
    ///
    /// Ordered by duration ascending, ties broken by id, truncated to
    /// `query.limit` rows.
    fn read_summaries(&self, query: &SummaryQuery) -> Result<Vec<TraceSummary>>;

    /// Full stored trace by id
    fn read(&self, id: &TraceId) -> Result<Option<StoredTrace>>;
}

/// Reference [`DurableTraceStore`] kept in memory
///
/// Reads and writes can be switched to fail, to exercise degraded-result
/// handling.
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    rows: RwLock<FxHashMap<TraceId, StoredTrace>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryTraceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reads fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl DurableTraceStore for InMemoryTraceStore {
    fn write(&self, trace: StoredTrace) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StorageWrite(format!("write of {} rejected", trace.id)));
        }
        self.rows.write().insert(trace.id.clone(), trace);
        Ok(())
    }

    fn read_summaries(&self, query: &SummaryQuery) -> Result<Vec<TraceSummary>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StorageRead("summary read rejected".into()));
        }
        let mut summaries: Vec<TraceSummary> = self
            .rows
            .read()
            .values()
            .filter(|row| row.matches(query))
            .map(StoredTrace::summary)
            .collect();
        summaries.sort_by(|a, b| {
            a.duration()
                .cmp(&b.duration())
                .then_with(|| a.id().cmp(b.id()))
        });
        summaries.truncate(query.limit);
        Ok(summaries)
    }

    fn read(&self, id: &TraceId) -> Result<Option<StoredTrace>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StorageRead(format!("read of {} rejected", id)));
        }
        Ok(self.rows.read().get(id).cloned())
    }
}
