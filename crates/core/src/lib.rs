//! Core types for the tierscope agent
//!
//! This crate defines the vocabulary shared by every other layer:
//! - [`Clock`] / [`Ticker`]: wall-clock and monotonic time sources
//! - [`Trace`]: one captured unit of work, mutated while it executes
//! - [`TraceSummary`]: immutable projection returned by queries
//! - [`QueryFilter`]: a parsed points request
//! - [`MetricNameHandle`]: identity-compared metric name
//! - [`ConfigService`]: live-reloadable agent configuration
//! - [`Error`]: the error taxonomy used across the workspace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod error;
pub mod filter;
pub mod metric;
pub mod summary;
pub mod trace;
pub mod types;

pub use clock::{Clock, ManualClock, ManualTicker, MonotonicTicker, SystemClock, Ticker};
pub use config::{AgentConfig, CoarseProfilingConfig, ConfigService, FineProfilingConfig};
pub use error::{Error, Result};
pub use filter::{QueryFilter, SummaryQuery, TraceCriteria, UserIdComparator};
pub use metric::{MetricNameHandle, MetricSnapshot, TraceMetric};
pub use summary::TraceSummary;
pub use trace::{Entry, EntryId, ProfileSample, Trace};
pub use types::TraceId;
