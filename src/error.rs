//! Public error type for the tierscope facade.
//!
//! Wraps the internal error taxonomy of the member crates in a smaller,
//! stable set of categories.

use thiserror::Error;

/// All tierscope errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Trace not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Request could not be parsed or fails validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A tier could not be read or written
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for tierscope operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if a tier read failed, so a result built from it would be partial.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

// Convert from internal core errors
impl From<tierscope_core::Error> for Error {
    fn from(e: tierscope_core::Error) -> Self {
        use tierscope_core::Error as CoreError;
        match e {
            CoreError::DuplicateId(id) => Error::Internal(format!("duplicate trace id {}", id)),
            CoreError::NotFound(id) => Error::NotFound(format!("trace {}", id)),
            CoreError::MalformedFilter(msg) => Error::InvalidRequest(msg),
            CoreError::UnrecognizedComparator(name) => {
                Error::InvalidRequest(format!("unrecognized user id comparator {}", name))
            }
            CoreError::StorageRead(msg) => Error::Storage(format!("read: {}", msg)),
            CoreError::StorageWrite(msg) => Error::Storage(format!("write: {}", msg)),
            CoreError::Config(msg) => Error::Config(msg),
            CoreError::Io(io_err) => Error::Io(io_err),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}
