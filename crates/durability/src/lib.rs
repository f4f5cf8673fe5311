//! Durability layer for tierscope
//!
//! This crate defines the contract of the durable trace tier and the
//! writer that moves traces into it:
//! - [`DurableTraceStore`]: summary reads and trace writes over stored traces
//! - [`StoredTrace`]: the persisted form of a trace
//! - [`InMemoryTraceStore`]: reference store, also used by tests
//! - [`TraceWriter`]: background thread draining write requests and
//!   releasing pending traces once their write is confirmed
//!
//! The storage engine's on-disk format is outside this crate; any engine
//! that can answer [`SummaryQuery`](tierscope_core::SummaryQuery) plugs in
//! through the trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod store;
pub mod writer;

pub use store::{DurableTraceStore, InMemoryTraceStore, StoredTrace};
pub use writer::TraceWriter;
