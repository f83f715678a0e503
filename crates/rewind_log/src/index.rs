//! Sequence index for locating replay targets.
//!
//! Maps each sequence number to its log offset and timestamp. All lookups
//! are binary searches, so resolving a target is `O(log n)` regardless of
//! how long the stream is.

use crate::target::{ReplayTarget, TargetBounds};
use chrono::{DateTime, Utc};
use rewind_core::{CoreError, CoreResult, LogOffset, Seq};
use serde::{Deserialize, Serialize};

/// One position in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIndexEntry {
    /// Sequence number of the event
    pub seq: Seq,
    /// Log offset of the event
    pub offset: LogOffset,
    /// Advisory only: used to find targets, never to order folds
    pub timestamp: DateTime<Utc>,
}

/// Result of resolving a target against the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    /// First sequence number present in the index (genesis when empty)
    pub lower: Seq,
    /// Inclusive upper bound of the replay; `None` when the target precedes
    /// the first event
    pub upper: Option<Seq>,
    /// Last sequence number in the index
    pub head: Option<Seq>,
    /// The target lies strictly past the last indexed event
    pub beyond_head: bool,
}

impl IndexRange {
    /// Whether the target resolves to no events at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.upper.is_none()
    }
}

/// Ordered sequence index of one stream
///
/// Entries are kept in strictly increasing `seq` order with non-decreasing
/// offsets. Timestamps may skew, so a running maximum is kept next to them
/// to give timestamp lookups a monotone array to search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventIndex {
    entries: Vec<EventIndexEntry>,
    clock_high_water: Vec<DateTime<Utc>>,
}

impl EventIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from entries in sequence order
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if sequence numbers are not strictly increasing
    /// or offsets decrease
    pub fn from_entries(entries: impl IntoIterator<Item = EventIndexEntry>) -> CoreResult<Self> {
        let mut index = Self::new();
        for entry in entries {
            index.push(entry)?;
        }
        Ok(index)
    }

    /// Append an entry at the head
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the entry would break index ordering
    pub fn push(&mut self, entry: EventIndexEntry) -> CoreResult<()> {
        if let Some(last) = self.entries.last() {
            if entry.seq <= last.seq {
                return Err(CoreError::out_of_range(format!(
                    "index seq {} does not follow {}",
                    entry.seq, last.seq
                )));
            }
            if entry.offset < last.offset {
                return Err(CoreError::out_of_range(format!(
                    "index offset {} precedes {}",
                    entry.offset, last.offset
                )));
            }
        }

        let high_water = match self.clock_high_water.last() {
            Some(prev) if *prev > entry.timestamp => *prev,
            _ => entry.timestamp,
        };
        self.entries.push(entry);
        self.clock_high_water.push(high_water);
        Ok(())
    }

    /// Resolve a target to the sequence range a replay must cover
    #[must_use]
    pub fn resolve(&self, target: &ReplayTarget) -> IndexRange {
        // Number of leading entries at or before the target
        let covered = match target {
            ReplayTarget::Offset(offset) => self.entries.partition_point(|e| e.offset <= *offset),
            ReplayTarget::Timestamp(at) => self.clock_high_water.partition_point(|t| t <= at),
        };

        let upper = covered.checked_sub(1).map(|i| self.entries[i].seq);
        let beyond_head = match (target, self.entries.last()) {
            (ReplayTarget::Offset(offset), Some(last)) => *offset > last.offset,
            (ReplayTarget::Timestamp(at), Some(_)) => self
                .clock_high_water
                .last()
                .is_some_and(|high| at > high),
            (_, None) => false,
        };

        IndexRange {
            lower: self.first().unwrap_or_default(),
            upper,
            head: self.head(),
            beyond_head,
        }
    }

    /// Resolve a loose two-field target
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` unless exactly one bound is set
    pub fn resolve_bounds(&self, bounds: TargetBounds) -> CoreResult<IndexRange> {
        let target = ReplayTarget::try_from(bounds)?;
        Ok(self.resolve(&target))
    }

    /// Look up the entry for a sequence number
    #[must_use]
    pub fn entry(&self, seq: Seq) -> Option<&EventIndexEntry> {
        self.entries
            .binary_search_by_key(&seq, |e| e.seq)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Greatest indexed sequence number at or before `seq`
    #[must_use]
    pub fn floor(&self, seq: Seq) -> Option<Seq> {
        let covered = self.entries.partition_point(|e| e.seq <= seq);
        covered.checked_sub(1).map(|i| self.entries[i].seq)
    }

    /// First sequence number in the index
    #[must_use]
    pub fn first(&self) -> Option<Seq> {
        self.entries.first().map(|e| e.seq)
    }

    /// Last sequence number in the index
    #[must_use]
    pub fn head(&self) -> Option<Seq> {
        self.entries.last().map(|e| e.seq)
    }

    /// All entries in sequence order
    #[must_use]
    pub fn entries(&self) -> &[EventIndexEntry] {
        &self.entries
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn entry(seq: u64, offset: u64, secs: i64) -> EventIndexEntry {
        EventIndexEntry {
            seq: Seq::from_raw(seq),
            offset: LogOffset::from_raw(offset),
            timestamp: ts(secs),
        }
    }

    fn sample() -> EventIndex {
        EventIndex::from_entries(vec![
            entry(1, 0, 10),
            entry(2, 40, 20),
            entry(3, 90, 30),
            entry(4, 150, 40),
            entry(5, 200, 50),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_exact_offset() {
        let range = sample().resolve(&ReplayTarget::offset(150));
        assert_eq!(range.upper, Some(Seq::from_raw(4)));
        assert_eq!(range.lower, Seq::from_raw(1));
        assert_eq!(range.head, Some(Seq::from_raw(5)));
        assert!(!range.beyond_head);
    }

    #[test]
    fn test_resolve_offset_between_entries() {
        let range = sample().resolve(&ReplayTarget::offset(120));
        assert_eq!(range.upper, Some(Seq::from_raw(3)));
    }

    #[test]
    fn test_resolve_offset_before_genesis() {
        let index = EventIndex::from_entries(vec![entry(1, 10, 0)]).unwrap();
        let range = index.resolve(&ReplayTarget::offset(5));
        assert!(range.is_empty());
        assert!(!range.beyond_head);
    }

    #[test]
    fn test_resolve_offset_beyond_head() {
        let range = sample().resolve(&ReplayTarget::offset(10_000));
        assert_eq!(range.upper, Some(Seq::from_raw(5)));
        assert!(range.beyond_head);
    }

    #[test]
    fn test_resolve_timestamp() {
        let range = sample().resolve(&ReplayTarget::timestamp(ts(35)));
        assert_eq!(range.upper, Some(Seq::from_raw(3)));
        let range = sample().resolve(&ReplayTarget::timestamp(ts(5)));
        assert!(range.is_empty());
    }

    #[test]
    fn test_resolve_timestamp_with_skew() {
        // seq 3 carries a clock that ran ahead; seq 4 is back in the past
        let index = EventIndex::from_entries(vec![
            entry(1, 0, 10),
            entry(2, 10, 20),
            entry(3, 20, 60),
            entry(4, 30, 25),
            entry(5, 40, 70),
        ])
        .unwrap();
        let range = index.resolve(&ReplayTarget::timestamp(ts(30)));
        assert_eq!(range.upper, Some(Seq::from_raw(2)));
        let range = index.resolve(&ReplayTarget::timestamp(ts(65)));
        assert_eq!(range.upper, Some(Seq::from_raw(4)));
    }

    #[test]
    fn test_resolve_empty_index() {
        let range = EventIndex::new().resolve(&ReplayTarget::offset(0));
        assert!(range.is_empty());
        assert_eq!(range.head, None);
        assert_eq!(range.lower, Seq::genesis());
    }

    #[test]
    fn test_resolve_bounds_malformed() {
        let err = sample().resolve_bounds(TargetBounds::default()).unwrap_err();
        assert!(matches!(err, CoreError::OutOfRange { .. }));
    }

    #[test]
    fn test_push_rejects_non_increasing_seq() {
        let mut index = sample();
        assert!(index.push(entry(5, 300, 60)).is_err());
        assert!(index.push(entry(6, 100, 60)).is_err());
        assert!(index.push(entry(6, 200, 60)).is_ok());
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_entry_and_floor() {
        let index = EventIndex::from_entries(vec![entry(2, 0, 0), entry(5, 10, 1)]).unwrap();
        assert_eq!(index.entry(Seq::from_raw(5)).map(|e| e.offset.as_u64()), Some(10));
        assert!(index.entry(Seq::from_raw(3)).is_none());
        assert_eq!(index.floor(Seq::from_raw(4)), Some(Seq::from_raw(2)));
        assert_eq!(index.floor(Seq::from_raw(1)), None);
    }

    proptest! {
        #[test]
        fn prop_offset_resolution_matches_linear_scan(
            gaps in proptest::collection::vec(0u64..50, 0..64),
            target in 0u64..3_000,
        ) {
            let mut offset = 0;
            let entries: Vec<_> = gaps
                .iter()
                .enumerate()
                .map(|(i, gap)| {
                    offset += gap;
                    entry(i as u64 + 1, offset, i as i64)
                })
                .collect();
            let index = EventIndex::from_entries(entries.clone()).unwrap();

            let expected = entries
                .iter()
                .filter(|e| e.offset.as_u64() <= target)
                .map(|e| e.seq)
                .max();
            prop_assert_eq!(index.resolve(&ReplayTarget::offset(target)).upper, expected);
        }
    }
}
