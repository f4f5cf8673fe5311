//! The trace entity
//!
//! A [`Trace`] is one captured unit of work. It is created and mutated by the
//! execution context that owns it, and read (and annotated with profile
//! samples) by background profilers and the query path.
//!
//! ## Synchronization
//!
//! There is no lock over the whole trace:
//! - identity, start time, start tick and background flag are immutable
//! - flags are atomics; the end tick is set once
//! - span entries live in an append-only list behind a `RwLock` that only the
//!   owner writes and the samplers read
//! - coarse and fine profile samples each have their own annotation slot
//!
//! ## Durations
//!
//! Duration only has a fixed value once the end tick is recorded. For an
//! active trace, callers pass a single tick they read once (see
//! [`Trace::duration_as_of`]), so a trace finishing mid-capture never yields
//! a negative or inconsistent value.

use crate::metric::{MetricNameHandle, MetricSnapshot, TraceMetric};
use crate::types::TraceId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Position of an entry within its trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(usize);

impl EntryId {
    /// The root entry, opened when the trace is created
    pub const ROOT: EntryId = EntryId(0);

    /// Index into [`Trace::entries`]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One span entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Entry message text
    pub message: String,
    /// Tick when the entry started
    pub start_tick: u64,
    /// Tick when the entry ended, if it has
    pub end_tick: Option<u64>,
    /// Nesting depth, root is 0
    pub depth: usize,
}

/// One stack sample attached to a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSample {
    /// Tick at which the sample was taken
    pub tick: u64,
    /// Frames, outermost first
    pub frames: Vec<String>,
}

#[derive(Debug, Default)]
struct EntryList {
    entries: Vec<Entry>,
    /// Indexes of entries not yet ended, outermost first
    open: SmallVec<[usize; 8]>,
}

/// One captured unit of work
pub struct Trace {
    id: TraceId,
    start_time: i64,
    start_tick: u64,
    background: bool,
    end_tick: OnceLock<u64>,
    error: AtomicBool,
    error_message: Mutex<Option<String>>,
    fine: AtomicBool,
    stuck: AtomicBool,
    user_id: RwLock<Option<String>>,
    entries: RwLock<EntryList>,
    metrics: RwLock<Vec<Arc<TraceMetric>>>,
    coarse_profile: Mutex<Vec<ProfileSample>>,
    fine_profile: Mutex<Vec<ProfileSample>>,
}

impl Trace {
    /// Create a trace with its root entry open
    ///
    /// # Arguments
    ///
    /// * `id` - Unique id, normally [`TraceId::new`]
    /// * `message` - Root entry message (the trace headline)
    /// * `background` - Whether this is background work rather than a request
    /// * `start_time` - Wall-clock start, milliseconds since epoch
    /// * `start_tick` - Ticker reading at start
    pub fn new(
        id: TraceId,
        message: impl Into<String>,
        background: bool,
        start_time: i64,
        start_tick: u64,
    ) -> Self {
        let mut list = EntryList::default();
        list.entries.push(Entry {
            message: message.into(),
            start_tick,
            end_tick: None,
            depth: 0,
        });
        list.open.push(0);
        Self {
            id,
            start_time,
            start_tick,
            background,
            end_tick: OnceLock::new(),
            error: AtomicBool::new(false),
            error_message: Mutex::new(None),
            fine: AtomicBool::new(false),
            stuck: AtomicBool::new(false),
            user_id: RwLock::new(None),
            entries: RwLock::new(list),
            metrics: RwLock::new(Vec::new()),
            coarse_profile: Mutex::new(Vec::new()),
            fine_profile: Mutex::new(Vec::new()),
        }
    }

    /// Trace id
    pub fn id(&self) -> &TraceId {
        &self.id
    }

    /// Wall-clock start in milliseconds
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Ticker reading at start
    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    /// Whether this trace is background work
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Root entry message
    pub fn headline(&self) -> String {
        self.entries
            .read()
            .entries
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_default()
    }

    // ========================================================================
    // Completion and duration
    // ========================================================================

    /// Record the end tick and close any entries still open
    ///
    /// Returns false if the trace was already completed; the first end tick
    /// wins.
    pub fn complete(&self, end_tick: u64) -> bool {
        if self.end_tick.set(end_tick).is_err() {
            return false;
        }
        let mut list = self.entries.write();
        let open = std::mem::take(&mut list.open);
        for index in open {
            if let Some(entry) = list.entries.get_mut(index) {
                entry.end_tick.get_or_insert(end_tick);
            }
        }
        true
    }

    /// Whether the end tick has been recorded
    pub fn is_completed(&self) -> bool {
        self.end_tick.get().is_some()
    }

    /// End tick, once completed
    pub fn end_tick(&self) -> Option<u64> {
        self.end_tick.get().copied()
    }

    /// Final duration in nanoseconds, once completed
    pub fn duration(&self) -> Option<u64> {
        self.end_tick()
            .map(|end| end.saturating_sub(self.start_tick))
    }

    /// Duration in nanoseconds as of `tick`
    ///
    /// For a completed trace this is the final duration regardless of
    /// `tick`. For an active trace it is the elapsed time up to `tick`,
    /// clamped at zero if `tick` was read before the trace started.
    pub fn duration_as_of(&self, tick: u64) -> u64 {
        self.end_tick()
            .unwrap_or(tick)
            .saturating_sub(self.start_tick)
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Whether an error was recorded
    pub fn is_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    /// Error message, if one was recorded with the error
    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().clone()
    }

    /// Mark the trace as errored
    pub fn set_error(&self, message: Option<String>) {
        if let Some(message) = message {
            *self.error_message.lock() = Some(message);
        }
        self.error.store(true, Ordering::Release);
    }

    /// Whether the trace was selected for fine profiling
    pub fn is_fine(&self) -> bool {
        self.fine.load(Ordering::Acquire)
    }

    /// Select the trace for fine profiling
    pub fn mark_fine(&self) {
        self.fine.store(true, Ordering::Release);
    }

    /// Whether the stuck collector flagged this trace
    pub fn is_stuck(&self) -> bool {
        self.stuck.load(Ordering::Acquire)
    }

    /// Flag the trace as stuck
    ///
    /// Returns true only for the call that set the flag.
    pub fn mark_stuck(&self) -> bool {
        !self.stuck.swap(true, Ordering::AcqRel)
    }

    /// User id, if set
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Set the user id; an empty string clears it
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        *self.user_id.write() = if user_id.is_empty() {
            None
        } else {
            Some(user_id)
        };
    }

    // ========================================================================
    // Entries
    // ========================================================================

    /// Open a nested entry
    pub fn start_entry(&self, message: impl Into<String>, start_tick: u64) -> EntryId {
        let mut list = self.entries.write();
        let depth = list.open.len();
        let index = list.entries.len();
        list.entries.push(Entry {
            message: message.into(),
            start_tick,
            end_tick: None,
            depth,
        });
        list.open.push(index);
        EntryId(index)
    }

    /// Close an entry opened with [`Trace::start_entry`]
    ///
    /// Ending an entry twice keeps the first end tick.
    pub fn end_entry(&self, id: EntryId, end_tick: u64) {
        let mut list = self.entries.write();
        if let Some(entry) = list.entries.get_mut(id.0) {
            entry.end_tick.get_or_insert(end_tick);
        }
        list.open.retain(|index| *index != id.0);
    }

    /// Append an entry whose timing is already known
    pub fn append_entry(&self, message: impl Into<String>, start_tick: u64, end_tick: u64) -> EntryId {
        let mut list = self.entries.write();
        let depth = list.open.len();
        let index = list.entries.len();
        list.entries.push(Entry {
            message: message.into(),
            start_tick,
            end_tick: Some(end_tick),
            depth,
        });
        EntryId(index)
    }

    /// Copy of all entries in creation order
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.read().entries.clone()
    }

    /// Number of entries, including the root
    pub fn entry_count(&self) -> usize {
        self.entries.read().entries.len()
    }

    /// Messages of the entries currently open, outermost first
    pub fn open_entry_stack(&self) -> Vec<String> {
        let list = self.entries.read();
        list.open
            .iter()
            .filter_map(|index| list.entries.get(*index))
            .map(|entry| entry.message.clone())
            .collect()
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    /// Accumulator for `name`, created on first use
    ///
    /// Lookup compares handles by identity.
    pub fn metric(&self, name: &MetricNameHandle) -> Arc<TraceMetric> {
        if let Some(metric) = self.find_metric(name) {
            return metric;
        }
        let mut metrics = self.metrics.write();
        // another writer may have added it between the two locks
        if let Some(metric) = metrics.iter().find(|m| m.name() == name) {
            return Arc::clone(metric);
        }
        let metric = Arc::new(TraceMetric::new(name.clone()));
        metrics.push(Arc::clone(&metric));
        metric
    }

    fn find_metric(&self, name: &MetricNameHandle) -> Option<Arc<TraceMetric>> {
        self.metrics
            .read()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    /// Copy of all metric values
    pub fn metrics(&self) -> Vec<MetricSnapshot> {
        self.metrics.read().iter().map(|m| m.snapshot()).collect()
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    /// Attach a coarse profiler sample
    pub fn add_coarse_sample(&self, sample: ProfileSample) {
        self.coarse_profile.lock().push(sample);
    }

    /// Attach a fine profiler sample
    pub fn add_fine_sample(&self, sample: ProfileSample) {
        self.fine_profile.lock().push(sample);
    }

    /// Copy of coarse samples
    pub fn coarse_samples(&self) -> Vec<ProfileSample> {
        self.coarse_profile.lock().clone()
    }

    /// Copy of fine samples
    pub fn fine_samples(&self) -> Vec<ProfileSample> {
        self.fine_profile.lock().clone()
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("id", &self.id)
            .field("start_tick", &self.start_tick)
            .field("end_tick", &self.end_tick())
            .field("background", &self.background)
            .field("error", &self.is_error())
            .field("fine", &self.is_fine())
            .field("stuck", &self.is_stuck())
            .finish()
    }
}
