//! In-memory trace tiers for tierscope
//!
//! This crate holds the structures mutated from many unrelated threads:
//! - [`TraceRegistry`]: active (in-flight) traces
//! - [`PendingTraceSink`]: completed traces not yet durable
//! - [`OnceMap`]: compute-once-per-key concurrent map
//! - [`MetricNameCache`]: interned metric name handles
//!
//! Both trace tiers are sharded tables: a snapshot copies one shard at a time
//! under that shard's read lock, so a query never holds up writers for longer
//! than one shard copy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod metric_names;
pub mod once_map;
pub mod registry;
pub mod table;

pub use metric_names::MetricNameCache;
pub use once_map::OnceMap;
pub use registry::{PendingTraceSink, TraceRegistry};
pub use table::TraceTable;
