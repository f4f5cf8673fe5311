//! Identifier types
//!
//! [`TraceId`] is the sole cross-tier deduplication key: a trace carries the
//! same id while active, pending and stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier for a trace
///
/// Assigned at creation and never changed. Generated ids are UUID v4 strings,
/// but any string is accepted so that ids read back from durable storage
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Create a new random TraceId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use tierscope_core::TraceId;
    ///
    /// let id1 = TraceId::new();
    /// let id2 = TraceId::new();
    /// assert_ne!(id1, id2);
    /// ```
    pub fn new() -> Self {
        TraceId(Uuid::new_v4().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        TraceId(s.to_string())
    }
}

impl From<String> for TraceId {
    fn from(s: String) -> Self {
        TraceId(s)
    }
}
