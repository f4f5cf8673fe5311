//! Cross-tier points query
//!
//! Answers "which traces fall in this window" from three tiers that traces
//! move through concurrently. The read order is what keeps the answer free
//! of gaps:
//!
//! ```text
//! 1. active snapshot        (registry)
//! 2. freeze `to`
//! 3. pending snapshot       (completed, not yet stored)
//! 4. stored summaries       (limit + 1 rows)
//! 5. merge pending into stored, by duration
//! 6. drop active/summary duplicates
//! 7. cut summaries to the limit left over by active points
//! ```
//!
//! A trace completing during the query leaves the registry only after it
//! entered pending, and leaves pending only after it was stored. Reading the
//! tiers in the same direction therefore sees it at least once; it may be
//! seen twice, which steps 5 and 6 resolve.

use crate::collector::TraceCollector;
use serde::Serialize;
use std::sync::Arc;
use tierscope_core::clock::NANOS_PER_SECOND;
use tierscope_core::{
    Clock, QueryFilter, Result, SummaryQuery, Ticker, Trace, TraceCriteria, TraceId, TraceSummary,
    UserIdComparator,
};
use tierscope_durability::DurableTraceStore;
use tierscope_storage::{PendingTraceSink, TraceRegistry};
use tracing::{debug, error, warn};

/// Point for a trace still executing
///
/// Serialized as `[capturedAt, elapsedSeconds, id]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePoint(pub i64, pub f64, pub TraceId);

impl ActivePoint {
    /// Wall-clock time of the capture, ms
    pub fn captured_at(&self) -> i64 {
        self.0
    }

    /// Elapsed time at capture, seconds
    pub fn elapsed_seconds(&self) -> f64 {
        self.1
    }

    /// Trace id
    pub fn id(&self) -> &TraceId {
        &self.2
    }
}

/// Point for a completed (or partially stored) trace
///
/// Serialized as `[capturedAt, durationSeconds, id]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPoint(pub i64, pub f64, pub TraceId);

impl StoredPoint {
    /// Wall-clock time the summary was captured, ms
    pub fn captured_at(&self) -> i64 {
        self.0
    }

    /// Duration, seconds
    pub fn duration_seconds(&self) -> f64 {
        self.1
    }

    /// Trace id
    pub fn id(&self) -> &TraceId {
        &self.2
    }
}

/// Result of [`TraceQueryEngine::query_points`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoints {
    /// Executing traces, by start order
    pub active_points: Vec<ActivePoint>,
    /// Completed traces, by duration ascending
    pub stored_points: Vec<StoredPoint>,
    /// More traces matched than `limit`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub limit_exceeded: bool,
}

impl TracePoints {
    /// Total number of points
    pub fn len(&self) -> usize {
        self.active_points.len() + self.stored_points.len()
    }

    /// Check if there are no points
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ActiveCapture {
    traces: Vec<Arc<Trace>>,
    // more traces matched than the limit admits
    truncated: bool,
    captured_at: i64,
    capture_tick: u64,
}

/// Query engine over the active, pending and stored tiers
#[derive(Debug)]
pub struct TraceQueryEngine {
    registry: Arc<TraceRegistry>,
    pending: Arc<PendingTraceSink>,
    store: Arc<dyn DurableTraceStore>,
    collector: Arc<TraceCollector>,
    clock: Arc<dyn Clock>,
    ticker: Arc<dyn Ticker>,
}

impl TraceQueryEngine {
    /// Create an engine over the given tiers
    pub fn new(
        registry: Arc<TraceRegistry>,
        pending: Arc<PendingTraceSink>,
        store: Arc<dyn DurableTraceStore>,
        collector: Arc<TraceCollector>,
        clock: Arc<dyn Clock>,
        ticker: Arc<dyn Ticker>,
    ) -> Self {
        Self {
            registry,
            pending,
            store,
            collector,
            clock,
            ticker,
        }
    }

    /// Points matching `filter` across all tiers
    ///
    /// A negative `from` is relative to now. `to == 0` means now; active
    /// and pending traces are only considered when the window reaches now.
    /// A filter whose bounds are inverted yields an empty result.
    ///
    /// Guarantees:
    /// - no trace id appears twice
    /// - at most `limit` points, `limit_exceeded` set when more matched
    /// - stored points ordered by duration ascending
    ///
    /// # Errors
    ///
    /// [`Error::StorageRead`](tierscope_core::Error::StorageRead) when the
    /// durable tier cannot be read.
    pub fn query_points(&self, filter: &QueryFilter) -> Result<TracePoints> {
        if let Err(e) = filter.validate() {
            warn!(error = %e, "malformed points filter");
            return Ok(TracePoints::default());
        }
        if let Some(UserIdComparator::Unrecognized(name)) = &filter.criteria.user_id_comparator {
            error!(
                comparator = %name,
                "unexpected user id comparator; user id filter matches nothing"
            );
        }

        let request_at = self.clock.current_time_millis();
        let from = if filter.from < 0 {
            request_at.saturating_add(filter.from)
        } else {
            filter.from
        };
        let in_range = (filter.to == 0 || filter.to > request_at) && from < request_at;

        let active = if in_range {
            Some(self.capture_active(&filter.criteria, filter.limit))
        } else {
            None
        };

        let to = if filter.to == 0 { request_at } else { filter.to };

        let pending = if in_range {
            self.pending_summaries(&filter.criteria)
        } else {
            Vec::new()
        };

        let stored = self.store.read_summaries(&SummaryQuery {
            from,
            to,
            criteria: filter.criteria.clone(),
            limit: filter.limit.saturating_add(1),
        })?;

        let mut summaries = merge_pending(stored, pending);
        let (mut active_traces, active_truncated, captured_at, capture_tick) = match active {
            Some(capture) => (
                capture.traces,
                capture.truncated,
                capture.captured_at,
                capture.capture_tick,
            ),
            None => (Vec::new(), false, request_at, 0),
        };
        remove_duplicates(&mut active_traces, &mut summaries);

        let combined_exceeded = active_traces.len() + summaries.len() > filter.limit;
        if combined_exceeded {
            summaries.truncate(filter.limit.saturating_sub(active_traces.len()));
        }
        let limit_exceeded = active_truncated || combined_exceeded;

        let points = TracePoints {
            active_points: active_traces
                .iter()
                .map(|trace| {
                    let elapsed = capture_tick.saturating_sub(trace.start_tick());
                    ActivePoint(captured_at, elapsed as f64 / NANOS_PER_SECOND, trace.id().clone())
                })
                .collect(),
            stored_points: summaries
                .into_iter()
                .map(|s| {
                    StoredPoint(
                        s.captured_at(),
                        s.duration() as f64 / NANOS_PER_SECOND,
                        s.id().clone(),
                    )
                })
                .collect(),
            limit_exceeded,
        };
        debug!(
            from,
            to,
            active = points.active_points.len(),
            stored = points.stored_points.len(),
            limit_exceeded,
            "points query"
        );
        Ok(points)
    }

    fn capture_active(&self, criteria: &TraceCriteria, limit: usize) -> ActiveCapture {
        let tick = self.ticker.read();
        let mut traces: Vec<Arc<Trace>> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|trace| {
                self.collector.should_store(trace, tick)
                    && criteria.matches(
                        trace.duration_as_of(tick),
                        trace.is_background(),
                        trace.is_error(),
                        trace.is_fine(),
                        trace.user_id().as_deref(),
                    )
            })
            .collect();
        traces.sort_by(|a, b| {
            a.start_tick()
                .cmp(&b.start_tick())
                .then_with(|| a.id().cmp(b.id()))
        });
        let truncated = traces.len() > limit;
        traces.truncate(limit);
        ActiveCapture {
            traces,
            truncated,
            captured_at: self.clock.current_time_millis(),
            capture_tick: self.ticker.read(),
        }
    }

    fn pending_summaries(&self, criteria: &TraceCriteria) -> Vec<TraceSummary> {
        let captured_at = self.clock.current_time_millis();
        let tick = self.ticker.read();
        let mut summaries: Vec<TraceSummary> = self
            .pending
            .snapshot()
            .into_iter()
            .filter_map(|trace| {
                let duration = trace.duration_as_of(tick);
                let matched = criteria.matches(
                    duration,
                    trace.is_background(),
                    trace.is_error(),
                    trace.is_fine(),
                    trace.user_id().as_deref(),
                );
                matched.then(|| {
                    TraceSummary::new(trace.id().clone(), captured_at, duration, trace.is_completed())
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            a.duration()
                .cmp(&b.duration())
                .then_with(|| a.id().cmp(b.id()))
        });
        summaries
    }
}

/// Merge pending summaries into duration-ordered stored summaries
///
/// Each pending summary is inserted after every stored summary whose
/// duration is less than or equal to its own. A pending summary whose id is
/// already present is dropped; the stored one is kept.
pub fn merge_pending(
    mut summaries: Vec<TraceSummary>,
    pending: Vec<TraceSummary>,
) -> Vec<TraceSummary> {
    for candidate in pending {
        let mut insert_at = 0;
        let mut collision = None;
        for (i, existing) in summaries.iter().enumerate() {
            if existing.duration() <= candidate.duration() {
                insert_at = i + 1;
            }
            if existing.id() == candidate.id() {
                collision = Some(i);
                break;
            }
        }
        match collision {
            Some(i) => {
                if summaries[i + 1..].iter().any(|s| s.id() == candidate.id()) {
                    error!(trace_id = %candidate.id(), "trace id stored more than once");
                    debug_assert!(false, "trace id {} stored more than once", candidate.id());
                }
            }
            None => summaries.insert(insert_at, candidate),
        }
    }
    summaries
}

/// Resolve traces present both as active and as a summary
///
/// A completed summary wins over the active entry. A partial summary (the
/// trace was stored while stuck) loses to the active entry, which is more
/// recent.
pub fn remove_duplicates(active: &mut Vec<Arc<Trace>>, summaries: &mut Vec<TraceSummary>) {
    active.retain(|trace| match summaries.iter().position(|s| s.id() == trace.id()) {
        Some(i) if summaries[i].is_completed() => false,
        Some(i) => {
            summaries.remove(i);
            true
        }
        None => true,
    });
}
