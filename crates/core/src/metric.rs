//! Metric names and per-trace metric accumulators
//!
//! A [`MetricNameHandle`] is compared by identity, not by value: two handles
//! are equal only if they point at the same interned allocation. Handles
//! are meant to be obtained from a process-wide cache so that every lookup
//! of the same `(plugin_id, name)` yields the same allocation. The hot path
//! then pays a pointer comparison per timing operation instead of two
//! string comparisons.

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct MetricNameInner {
    plugin_id: String,
    name: String,
}

/// Interned metric name with identity equality
#[derive(Clone)]
pub struct MetricNameHandle(Arc<MetricNameInner>);

impl MetricNameHandle {
    /// Allocate a fresh handle
    ///
    /// Two handles allocated separately never compare equal even with the
    /// same strings. Use a metric name cache to obtain shared handles.
    pub fn allocate(plugin_id: impl Into<String>, name: impl Into<String>) -> Self {
        MetricNameHandle(Arc::new(MetricNameInner {
            plugin_id: plugin_id.into(),
            name: name.into(),
        }))
    }

    /// Plugin that owns this metric
    pub fn plugin_id(&self) -> &str {
        &self.0.plugin_id
    }

    /// Metric name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Whether both handles refer to the same interned allocation
    #[inline]
    pub fn same_as(&self, other: &MetricNameHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for MetricNameHandle {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for MetricNameHandle {}

impl Hash for MetricNameHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for MetricNameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricNameHandle")
            .field("plugin_id", &self.0.plugin_id)
            .field("name", &self.0.name)
            .field("ptr", &Arc::as_ptr(&self.0))
            .finish()
    }
}

/// Timing accumulator for one metric within one trace
///
/// All fields are atomics so profilers can read while the owning execution
/// context records.
#[derive(Debug)]
pub struct TraceMetric {
    name: MetricNameHandle,
    count: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl TraceMetric {
    /// Create an empty accumulator
    pub fn new(name: MetricNameHandle) -> Self {
        Self {
            name,
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    /// Metric name handle
    pub fn name(&self) -> &MetricNameHandle {
        &self.name
    }

    /// Record one timed measurement
    pub fn record(&self, nanos: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.min_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    /// Point-in-time copy of the accumulated values
    pub fn snapshot(&self) -> MetricSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        MetricSnapshot {
            name: self.name.name().to_string(),
            count,
            total_nanos: self.total_nanos.load(Ordering::Relaxed),
            min_nanos: if count == 0 {
                0
            } else {
                self.min_nanos.load(Ordering::Relaxed)
            },
            max_nanos: self.max_nanos.load(Ordering::Relaxed),
        }
    }
}

/// Copied metric values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Metric name
    pub name: String,
    /// Number of measurements
    pub count: u64,
    /// Sum of measurements
    pub total_nanos: u64,
    /// Smallest measurement (0 when empty)
    pub min_nanos: u64,
    /// Largest measurement
    pub max_nanos: u64,
}
