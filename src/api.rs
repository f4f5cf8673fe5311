//! JSON points service.
//!
//! Request body (camelCase, durations in nanoseconds, times in ms):
//!
//! ```json
//! {"from": -60000, "to": 0, "low": 0, "high": 0, "background": null,
//!  "errorOnly": false, "fineOnly": false,
//!  "userIdComparator": "begins", "userId": "al", "limit": 100}
//! ```
//!
//! Response:
//!
//! ```json
//! {"status": "ok",
//!  "activePoints": [[1700000000000, 12.5, "7c9e..."]],
//!  "storedPoints": [[1699999990000, 3.2, "a1f0..."]],
//!  "limitExceeded": true}
//! ```
//!
//! A request that does not parse yields an empty `"ok"` response. A tier
//! read failure yields `"error"` with a message and no points, never a
//! partial result.

use crate::error::{Error, Result};
use serde::Serialize;
use tierscope_core::QueryFilter;
use tierscope_engine::TracePoints;

/// Outcome of a points request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The query ran; the points may be empty
    Ok,
    /// The query itself failed
    Error,
}

/// Body of a points response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    /// Whether the query ran
    pub status: ResponseStatus,
    /// Failure description when `status` is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Result points
    #[serde(flatten)]
    pub points: TracePoints,
}

impl PointsResponse {
    /// Successful response
    pub fn ok(points: TracePoints) -> Self {
        Self {
            status: ResponseStatus::Ok,
            message: None,
            points,
        }
    }

    /// Successful response with no points
    pub fn empty() -> Self {
        Self::ok(TracePoints::default())
    }

    /// Failed response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            points: TracePoints::default(),
        }
    }

    /// Check if the query ran
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::from)
    }
}

/// Parse and validate a points request body.
pub fn parse_filter(body: &str) -> Result<QueryFilter> {
    let filter: QueryFilter = serde_json::from_str(body)?;
    filter.validate()?;
    Ok(filter)
}
