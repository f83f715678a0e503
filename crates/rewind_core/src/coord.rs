//! Log coordinates for REWIND.
//!
//! Sequence numbers are the ordering authority. Offsets only locate a
//! position in the log; timestamps are advisory and live on index entries.

use serde::{Deserialize, Serialize};

/// Sequence number - strictly increasing per stream
///
/// `Seq(0)` is genesis: the position before the first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(u64);

impl Seq {
    /// Genesis, before any event
    #[must_use]
    pub const fn genesis() -> Self {
        Self(0)
    }

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this is genesis
    #[must_use]
    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    /// The next sequence number
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Number of sequence numbers in `(self, upper]`
    #[must_use]
    pub const fn distance_to(&self, upper: Seq) -> u64 {
        upper.0.saturating_sub(self.0)
    }
}

impl Default for Seq {
    fn default() -> Self {
        Self::genesis()
    }
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Seq {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Log offset - byte or record position, monotone non-decreasing, may have gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogOffset(u64);

impl LogOffset {
    /// Offset zero
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for LogOffset {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for LogOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<u64> for LogOffset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
