//! # Tierscope
//!
//! Trace lifecycle registry and cross-tier query engine for an in-process
//! application performance monitoring agent.
//!
//! A trace is one unit of work (a request, a background job) captured while
//! it runs. It moves through three tiers: active while executing, pending
//! between completion and the durable write, and stored afterwards. Queries
//! see every trace exactly once no matter where it is in that journey.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tierscope::prelude::*;
//!
//! let agent = Agent::in_memory()?;
//!
//! // Instrumentation
//! let servlet = agent.plugin_services("servlet");
//! let trace = servlet.begin_trace("GET /orders", false)?;
//! let query = servlet.start_entry(&trace, "SELECT * FROM orders");
//! servlet.end_entry(&trace, query);
//! servlet.complete_trace(&trace);
//!
//! // Points query, typed or JSON
//! let points = agent.query_points(&QueryFilter::new(100).with_range(-60_000, 0))?;
//! let response = agent.handle_points_request(r#"{"from": -60000, "limit": 100}"#);
//!
//! agent.close();
//! ```
//!
//! ## Layers
//!
//! - `tierscope-core`: trace entity, filters, clocks, configuration, errors
//! - `tierscope-storage`: active and pending tiers, compute-once caches
//! - `tierscope-durability`: durable store contract and background writer
//! - `tierscope-engine`: schedulers, completion pipeline, query engine

#![warn(missing_docs)]

mod agent;
mod api;
mod error;

pub mod prelude;

// Re-export main entry points
pub use agent::{Agent, AgentBuilder, AgentMetrics};
pub use api::{parse_filter, PointsResponse, ResponseStatus};
pub use error::{Error, Result};

// Re-export the types that cross the facade
pub use tierscope_core::{
    AgentConfig, Clock, CoarseProfilingConfig, FineProfilingConfig, ManualClock, ManualTicker,
    MetricNameHandle, QueryFilter, Ticker, Trace, TraceCriteria, TraceId, UserIdComparator,
};
pub use tierscope_durability::{DurableTraceStore, InMemoryTraceStore, StoredTrace};
pub use tierscope_engine::{
    ActivePoint, EntryStackSampler, MetricTimer, PluginServices, StackSampler, StoredPoint,
    TracePoints,
};
