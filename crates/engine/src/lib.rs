//! Trace engine for tierscope
//!
//! This crate wires the tiers together and runs everything that moves traces
//! between them:
//! - [`Timer`]: shared scheduler thread for the background tasks
//! - [`StuckTraceCollector`], [`CoarseProfiler`], [`FineProfileScheduler`]
//! - [`TraceCollector`]: the completion pipeline (active -> pending -> stored)
//! - [`PluginServices`] / [`PluginServiceRegistry`]: per-plugin facade
//! - [`TraceQueryEngine`]: cross-tier points query
//! - [`TraceModule`]: composition root owning all of the above
//!
//! # Architecture
//!
//! ```text
//! plugin ──begin_trace──▶ TraceRegistry (active)
//!                              │   ▲ stuck / coarse / fine samplers
//!                       complete_trace
//!                              ▼
//!                        PendingTraceSink ──TraceWriter──▶ DurableTraceStore
//!
//! query_points: active ──▶ pending ──▶ stored ──▶ merge ──▶ dedup ──▶ limit
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coarse;
pub mod collector;
pub mod fine;
pub mod module;
pub mod plugin;
pub mod query;
pub mod sampler;
pub mod stuck;
pub mod timer;

pub use coarse::CoarseProfiler;
pub use collector::TraceCollector;
pub use fine::FineProfileScheduler;
pub use module::{ModuleOptions, TraceModule};
pub use plugin::{MetricTimer, PluginServiceRegistry, PluginServices};
pub use query::{ActivePoint, StoredPoint, TracePoints, TraceQueryEngine};
pub use sampler::{EntryStackSampler, StackSampler};
pub use stuck::StuckTraceCollector;
pub use timer::{TaskHandle, Timer};
