//! Core error types for REWIND.

use crate::coord::Seq;
use crate::id::StreamId;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Collaborator failures (`StreamNotFound`, `RangeUnavailable`) are surfaced
/// unchanged; nothing in the replay path retries them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Malformed or unsatisfiable replay target, or a broken index invariant
    #[error("Out of range: {reason}")]
    OutOfRange {
        /// What was wrong with the target
        reason: String,
    },

    /// The stream is unknown to the event source
    #[error("Stream not found: {stream}")]
    StreamNotFound {
        /// Stream that was requested
        stream: StreamId,
    },

    /// The event source cannot serve the requested range
    #[error("Range ({from}, {to}] unavailable for stream {stream}")]
    RangeUnavailable {
        /// Stream that was requested
        stream: StreamId,
        /// Exclusive lower bound
        from: Seq,
        /// Inclusive upper bound
        to: Seq,
    },

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// State, payload, or checkpoint could not be encoded or decoded
    #[error("Encoding error: {reason}")]
    Encoding {
        /// Underlying encoder message
        reason: String,
    },

    /// I/O failure in a file-backed adapter
    #[error("IO error: {reason}")]
    Io {
        /// Underlying I/O message
        reason: String,
    },
}

impl CoreError {
    /// Shorthand for [`CoreError::OutOfRange`]
    pub fn out_of_range(reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            reason: reason.into(),
        }
    }

    /// Whether this error is a cooperative cancellation
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}
