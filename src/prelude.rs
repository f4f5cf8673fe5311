//! Convenient imports for tierscope.
//!
//! ```ignore
//! use tierscope::prelude::*;
//!
//! let agent = Agent::in_memory()?;
//! let trace = agent.plugin_services("servlet").begin_trace("GET /", false)?;
//! ```

// Main entry point
pub use crate::agent::{Agent, AgentBuilder};

// Error handling
pub use crate::error::{Error, Result};

// JSON service
pub use crate::api::{PointsResponse, ResponseStatus};

// Query types
pub use tierscope_core::{QueryFilter, TraceId, UserIdComparator};
pub use tierscope_engine::{ActivePoint, StoredPoint, TracePoints};

// Instrumentation
pub use tierscope_engine::{MetricTimer, PluginServices};
pub use tierscope_core::{AgentConfig, Trace};
