//! Trace summaries returned by list queries

use crate::types::TraceId;
use serde::{Deserialize, Serialize};

/// Lightweight projection of a trace
///
/// Built fresh per query from a pending trace or a stored row and never
/// mutated afterwards. Equality and hashing cover all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    id: TraceId,
    captured_at: i64,
    duration: u64,
    completed: bool,
}

impl TraceSummary {
    /// Create a summary
    ///
    /// `captured_at` is wall-clock milliseconds, `duration` nanoseconds.
    pub fn new(id: TraceId, captured_at: i64, duration: u64, completed: bool) -> Self {
        Self {
            id,
            captured_at,
            duration,
            completed,
        }
    }

    /// Trace id
    pub fn id(&self) -> &TraceId {
        &self.id
    }

    /// Wall-clock capture time in milliseconds
    pub fn captured_at(&self) -> i64 {
        self.captured_at
    }

    /// Duration in nanoseconds
    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// Whether the trace had finished when it was captured
    ///
    /// Stuck traces are stored before they finish, so a stored summary can
    /// be incomplete.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}
