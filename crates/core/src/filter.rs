//! Query filters
//!
//! A [`QueryFilter`] is the parsed form of a points request. The predicate
//! fields are grouped in [`TraceCriteria`] so the same matching rules apply
//! to active traces, pending traces and stored rows.
//!
//! ## Conventions
//!
//! | Field | Unit | Zero means |
//! |-------|------|------------|
//! | `from` | ms since epoch | epoch; negative = "this many ms before now" |
//! | `to` | ms since epoch | now |
//! | `low` | ns | no lower bound |
//! | `high` | ns | unbounded |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a user id filter is compared against a trace's user id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserIdComparator {
    /// Trace user id starts with the filter value
    Begins,
    /// Trace user id contains the filter value
    Contains,
    /// Trace user id equals the filter value
    Equals,
    /// Unknown comparator name; never matches
    Unrecognized(String),
}

impl UserIdComparator {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &str {
        match self {
            UserIdComparator::Begins => "begins",
            UserIdComparator::Contains => "contains",
            UserIdComparator::Equals => "equals",
            UserIdComparator::Unrecognized(name) => name,
        }
    }

    /// Compare a trace user id against the filter value
    ///
    /// An unrecognized comparator matches nothing.
    pub fn matches(&self, trace_user_id: &str, filter_user_id: &str) -> bool {
        match self {
            UserIdComparator::Begins => trace_user_id.starts_with(filter_user_id),
            UserIdComparator::Contains => trace_user_id.contains(filter_user_id),
            UserIdComparator::Equals => trace_user_id == filter_user_id,
            UserIdComparator::Unrecognized(_) => false,
        }
    }
}

impl FromStr for UserIdComparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "begins" | "prefix" => Ok(UserIdComparator::Begins),
            "contains" | "substring" => Ok(UserIdComparator::Contains),
            "equals" | "exact" => Ok(UserIdComparator::Equals),
            _ => Err(Error::UnrecognizedComparator(s.to_string())),
        }
    }
}

impl From<String> for UserIdComparator {
    fn from(s: String) -> Self {
        s.parse()
            .unwrap_or(UserIdComparator::Unrecognized(s))
    }
}

impl From<UserIdComparator> for String {
    fn from(c: UserIdComparator) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for UserIdComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicates shared by every tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceCriteria {
    /// Minimum duration in nanoseconds
    pub low: u64,
    /// Maximum duration in nanoseconds, 0 = unbounded
    pub high: u64,
    /// Background filter; `None` matches both
    pub background: Option<bool>,
    /// Only errored traces
    pub error_only: bool,
    /// Only fine-profiled traces
    pub fine_only: bool,
    /// How `user_id` is compared
    pub user_id_comparator: Option<UserIdComparator>,
    /// User id to compare against
    pub user_id: Option<String>,
}

impl TraceCriteria {
    /// Inclusive upper duration bound with 0 mapped to unbounded
    pub fn high_bound(&self) -> u64 {
        if self.high == 0 {
            u64::MAX
        } else {
            self.high
        }
    }

    /// Duration within `[low, high]`
    pub fn matches_duration(&self, duration: u64) -> bool {
        duration >= self.low && duration <= self.high_bound()
    }

    /// Background flag matches, or no background filter set
    pub fn matches_background(&self, background: bool) -> bool {
        self.background.map_or(true, |b| b == background)
    }

    /// Error-only filter satisfied
    pub fn matches_error(&self, error: bool) -> bool {
        !self.error_only || error
    }

    /// Fine-only filter satisfied
    pub fn matches_fine(&self, fine: bool) -> bool {
        !self.fine_only || fine
    }

    /// User id filter satisfied
    ///
    /// Without both a comparator and a filter value every trace matches.
    /// Otherwise a trace without a user id never matches.
    pub fn matches_user_id(&self, user_id: Option<&str>) -> bool {
        let (comparator, wanted) = match (&self.user_id_comparator, &self.user_id) {
            (Some(c), Some(u)) => (c, u),
            _ => return true,
        };
        match user_id {
            Some(actual) => comparator.matches(actual, wanted),
            None => false,
        }
    }

    /// All predicates at once
    pub fn matches(
        &self,
        duration: u64,
        background: bool,
        error: bool,
        fine: bool,
        user_id: Option<&str>,
    ) -> bool {
        self.matches_duration(duration)
            && self.matches_background(background)
            && self.matches_error(error)
            && self.matches_fine(fine)
            && self.matches_user_id(user_id)
    }

    fn validate(&self) -> Result<()> {
        if self.high != 0 && self.low > self.high {
            return Err(Error::MalformedFilter(format!(
                "low duration {} exceeds high duration {}",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// A points request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    /// Window start in ms; negative means relative to request time
    #[serde(default)]
    pub from: i64,
    /// Window end in ms; 0 means now
    #[serde(default)]
    pub to: i64,
    /// Trace predicates
    #[serde(flatten)]
    pub criteria: TraceCriteria,
    /// Maximum number of points returned
    pub limit: usize,
}

impl QueryFilter {
    /// Unbounded filter returning at most `limit` points
    pub fn new(limit: usize) -> Self {
        Self {
            from: 0,
            to: 0,
            criteria: TraceCriteria::default(),
            limit,
        }
    }

    /// Set the time window
    pub fn with_range(mut self, from: i64, to: i64) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Set the duration range in nanoseconds
    pub fn with_duration(mut self, low: u64, high: u64) -> Self {
        self.criteria.low = low;
        self.criteria.high = high;
        self
    }

    /// Set the background filter
    pub fn with_background(mut self, background: Option<bool>) -> Self {
        self.criteria.background = background;
        self
    }

    /// Only errored traces
    pub fn error_only(mut self) -> Self {
        self.criteria.error_only = true;
        self
    }

    /// Only fine-profiled traces
    pub fn fine_only(mut self) -> Self {
        self.criteria.fine_only = true;
        self
    }

    /// Filter on user id
    pub fn with_user_id(mut self, comparator: UserIdComparator, user_id: impl Into<String>) -> Self {
        self.criteria.user_id_comparator = Some(comparator);
        self.criteria.user_id = Some(user_id.into());
        self
    }

    /// Reject filters that cannot match anything by construction
    pub fn validate(&self) -> Result<()> {
        if self.to != 0 && self.from >= 0 && self.from > self.to {
            return Err(Error::MalformedFilter(format!(
                "window start {} is after window end {}",
                self.from, self.to
            )));
        }
        self.criteria.validate()
    }
}

/// Parameters of a stored-summary read
///
/// `from` and `to` are absolute; `limit` is the number of rows requested.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryQuery {
    /// Inclusive window start in ms
    pub from: i64,
    /// Inclusive window end in ms
    pub to: i64,
    /// Trace predicates
    pub criteria: TraceCriteria,
    /// Maximum rows returned
    pub limit: usize,
}

impl SummaryQuery {
    /// Captured-at within `[from, to]`
    pub fn matches_captured_at(&self, captured_at: i64) -> bool {
        captured_at >= self.from && captured_at <= self.to
    }
}
