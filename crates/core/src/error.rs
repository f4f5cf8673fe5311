//! Error taxonomy shared by the registry, query and scheduling layers
//!
//! Not every variant is a hard failure. [`Error::NotFound`] is a benign race
//! between completion and unregistration, [`Error::MalformedFilter`] is
//! recovered into an empty result, and [`Error::UnrecognizedComparator`]
//! degrades to "never matches". Callers decide with the classification
//! helpers below.

use crate::types::TraceId;
use thiserror::Error;

/// All tierscope errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A trace with this id is already registered
    #[error("duplicate trace id: {0}")]
    DuplicateId(TraceId),

    /// No trace with this id is registered
    #[error("trace not found: {0}")]
    NotFound(TraceId),

    /// A points request failed to parse or validate
    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    /// Reading one of the trace tiers failed
    #[error("storage read error: {0}")]
    StorageRead(String),

    /// Persisting a trace failed
    #[error("storage write error: {0}")]
    StorageWrite(String),

    /// User id comparator name is not one of begins/contains/equals
    #[error("unrecognized comparator: {0}")]
    UnrecognizedComparator(String),

    /// Configuration value rejected
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tierscope operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this error leaves a query result incomplete.
    ///
    /// Degraded results must be reported to the caller, never presented as
    /// a complete trace list.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Error::StorageRead(_))
    }

    /// Check if this error indicates a registry invariant violation.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Error::DuplicateId(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
