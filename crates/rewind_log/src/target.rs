//! Replay targets.

use chrono::{DateTime, Utc};
use rewind_core::{CoreError, LogOffset};
use serde::{Deserialize, Serialize};

/// Point in a stream's history to reconstruct
///
/// Exactly one bound is set. Offsets and timestamps only locate the upper
/// sequence number; folding is always in sequence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TargetBounds", into = "TargetBounds")]
pub enum ReplayTarget {
    /// Everything at or before this log offset
    Offset(LogOffset),
    /// Everything at or before this wall-clock instant
    ///
    /// Under clock skew this is the longest prefix of the stream whose
    /// timestamps are all at or before the instant, so an early-stamped event
    /// that follows a late-stamped one is not included.
    Timestamp(DateTime<Utc>),
}

impl ReplayTarget {
    /// Offset target
    #[must_use]
    pub const fn offset(offset: u64) -> Self {
        Self::Offset(LogOffset::from_raw(offset))
    }

    /// Timestamp target
    #[must_use]
    pub const fn timestamp(at: DateTime<Utc>) -> Self {
        Self::Timestamp(at)
    }
}

impl std::fmt::Display for ReplayTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offset(offset) => write!(f, "offset {}", offset),
            Self::Timestamp(at) => write!(f, "timestamp {}", at.to_rfc3339()),
        }
    }
}

/// Loose two-field form of a target, as it arrives from callers or files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBounds {
    /// Log offset bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<LogOffset>,
    /// Wall-clock bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<TargetBounds> for ReplayTarget {
    type Error = CoreError;

    fn try_from(bounds: TargetBounds) -> Result<Self, Self::Error> {
        match (bounds.offset, bounds.timestamp) {
            (Some(offset), None) => Ok(Self::Offset(offset)),
            (None, Some(at)) => Ok(Self::Timestamp(at)),
            (None, None) => Err(CoreError::out_of_range(
                "replay target has neither offset nor timestamp",
            )),
            (Some(_), Some(_)) => Err(CoreError::out_of_range(
                "replay target has both offset and timestamp",
            )),
        }
    }
}

impl From<ReplayTarget> for TargetBounds {
    fn from(target: ReplayTarget) -> Self {
        match target {
            ReplayTarget::Offset(offset) => Self {
                offset: Some(offset),
                timestamp: None,
            },
            ReplayTarget::Timestamp(at) => Self {
                offset: None,
                timestamp: Some(at),
            },
        }
    }
}
