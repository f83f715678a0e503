//! In-memory append-only event log.
//!
//! Serves both [`EventSource`] and [`IndexSource`]. Used by tests, the CLI,
//! and anywhere a log fits in memory.

use crate::event::{Event, EventMetadata};
use crate::index::EventIndex;
use crate::source::{EventSource, IndexSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewind_core::{CoreError, CoreResult, LogOffset, Seq, StreamId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Fixed per-record framing added to each payload when assigning offsets
pub const RECORD_HEADER_LEN: u64 = 32;

#[derive(Debug, Clone, Default)]
struct StreamLog {
    events: Vec<Event>,
    index: Arc<EventIndex>,
}

impl StreamLog {
    fn head(&self) -> Option<&Event> {
        self.events.last()
    }

    fn push(&mut self, event: Event) -> CoreResult<()> {
        Arc::make_mut(&mut self.index).push(event.metadata.index_entry())?;
        self.events.push(event);
        Ok(())
    }
}

/// Append-only log holding any number of streams
#[derive(Debug, Default)]
pub struct MemoryLog {
    streams: RwLock<BTreeMap<StreamId, StreamLog>>,
}

impl MemoryLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, assigning its sequence number and offset
    ///
    /// # Errors
    ///
    /// Returns error if the index rejects the new entry
    pub fn append(
        &self,
        stream: &StreamId,
        kind: impl Into<String>,
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<EventMetadata> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let log = streams.entry(stream.clone()).or_default();

        let (seq, offset) = match log.head() {
            Some(last) => (
                last.seq().next(),
                LogOffset::from_raw(
                    last.offset().as_u64() + RECORD_HEADER_LEN + last.payload.len() as u64,
                ),
            ),
            None => (Seq::from_raw(1), LogOffset::zero()),
        };

        let metadata = EventMetadata::new(stream.clone(), seq, offset, timestamp);
        log.push(Event::new(metadata.clone(), kind).with_payload(payload))?;
        Ok(metadata)
    }

    /// Append an event with a JSON payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be encoded
    pub fn append_json<T: Serialize>(
        &self,
        stream: &StreamId,
        kind: impl Into<String>,
        payload: &T,
        timestamp: DateTime<Utc>,
    ) -> CoreResult<EventMetadata> {
        let bytes = serde_json::to_vec(payload)?;
        self.append(stream, kind, bytes, timestamp)
    }

    /// Insert a fully formed event, e.g. one loaded from a file
    ///
    /// The event must directly follow the stream head: next sequence number,
    /// strictly greater offset.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if the event would leave a gap or break ordering
    pub fn insert(&self, event: Event) -> CoreResult<()> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        let log = streams.entry(event.metadata.stream.clone()).or_default();

        match log.head() {
            Some(last) if event.seq() != last.seq().next() => {
                return Err(CoreError::out_of_range(format!(
                    "event seq {} does not follow head {} of {}",
                    event.seq(),
                    last.seq(),
                    event.metadata.stream
                )));
            }
            Some(last) if event.offset() <= last.offset() => {
                return Err(CoreError::out_of_range(format!(
                    "event offset {} does not follow {}",
                    event.offset(),
                    last.offset()
                )));
            }
            None if event.seq().is_genesis() => {
                return Err(CoreError::out_of_range("seq 0 is reserved for genesis"));
            }
            _ => {}
        }

        log.push(event)
    }

    /// Last sequence number of a stream
    #[must_use]
    pub fn head(&self, stream: &StreamId) -> Option<Seq> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.get(stream).and_then(|log| log.head().map(Event::seq))
    }

    /// Number of events in a stream
    #[must_use]
    pub fn len(&self, stream: &StreamId) -> usize {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.get(stream).map_or(0, |log| log.events.len())
    }

    /// Known stream ids, in sorted order
    #[must_use]
    pub fn streams(&self) -> Vec<StreamId> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams.keys().cloned().collect()
    }
}

#[async_trait]
impl EventSource for MemoryLog {
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        let log = streams.get(stream).ok_or_else(|| CoreError::StreamNotFound {
            stream: stream.clone(),
        })?;

        if to_inclusive <= from_exclusive {
            return Ok(Vec::new());
        }

        let unavailable = || CoreError::RangeUnavailable {
            stream: stream.clone(),
            from: from_exclusive,
            to: to_inclusive,
        };
        let first = log.events.first().map(Event::seq).ok_or_else(unavailable)?;
        let head = log.head().map(Event::seq).ok_or_else(unavailable)?;
        if to_inclusive > head || from_exclusive.next() < first {
            return Err(unavailable());
        }

        let start = log.events.partition_point(|e| e.seq() <= from_exclusive);
        let end = log.events.partition_point(|e| e.seq() <= to_inclusive);
        Ok(log.events[start..end].to_vec())
    }
}

#[async_trait]
impl IndexSource for MemoryLog {
    async fn lookup_index(&self, stream: &StreamId) -> CoreResult<Arc<EventIndex>> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams
            .get(stream)
            .map(|log| Arc::clone(&log.index))
            .ok_or_else(|| CoreError::StreamNotFound {
                stream: stream.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn filled(n: u64) -> (MemoryLog, StreamId) {
        let log = MemoryLog::new();
        let stream = StreamId::new("cart-1");
        for i in 0..n {
            log.append(&stream, "tick", vec![0; 8], ts(i as i64)).unwrap();
        }
        (log, stream)
    }

    #[test]
    fn test_append_assigns_seq_and_offset() {
        let (log, stream) = filled(3);
        assert_eq!(log.head(&stream), Some(Seq::from_raw(3)));
        assert_eq!(log.len(&stream), 3);
        assert_eq!(log.streams(), vec![stream]);
    }

    #[tokio::test]
    async fn test_offsets_strictly_increase() {
        let (log, stream) = filled(4);
        let events = log
            .events_in_range(&stream, Seq::genesis(), Seq::from_raw(4))
            .await
            .unwrap();
        let offsets: Vec<u64> = events.iter().map(|e| e.offset().as_u64()).collect();
        assert_eq!(offsets, vec![0, 40, 80, 120]);
    }

    #[tokio::test]
    async fn test_events_in_range_is_half_open() {
        let (log, stream) = filled(5);
        let events = log
            .events_in_range(&stream, Seq::from_raw(2), Seq::from_raw(4))
            .await
            .unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.seq().as_u64()).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_events_in_range_empty_when_bounds_meet() {
        let (log, stream) = filled(2);
        let events = log
            .events_in_range(&stream, Seq::from_raw(2), Seq::from_raw(2))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_range_past_head_unavailable() {
        let (log, stream) = filled(2);
        let err = log
            .events_in_range(&stream, Seq::genesis(), Seq::from_raw(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RangeUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let log = MemoryLog::new();
        let stream = StreamId::new("ghost");
        let err = log.lookup_index(&stream).await.unwrap_err();
        assert_eq!(err, CoreError::StreamNotFound { stream: stream.clone() });
        let err = log
            .events_in_range(&stream, Seq::genesis(), Seq::from_raw(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StreamNotFound { .. }));
    }

    #[tokio::test]
    async fn test_index_tracks_appends() {
        let (log, stream) = filled(3);
        let before = log.lookup_index(&stream).await.unwrap();
        log.append(&stream, "tick", Vec::new(), ts(9)).unwrap();
        let after = log.lookup_index(&stream).await.unwrap();
        assert_eq!(before.len(), 3);
        assert_eq!(after.len(), 4);
        assert_eq!(after.head(), Some(Seq::from_raw(4)));
    }

    #[test]
    fn test_insert_rejects_gaps() {
        let (log, stream) = filled(1);
        let gap = Event::new(
            EventMetadata::new(stream.clone(), Seq::from_raw(3), LogOffset::from_raw(500), ts(3)),
            "tick",
        );
        assert!(matches!(log.insert(gap), Err(CoreError::OutOfRange { .. })));

        let next = Event::new(
            EventMetadata::new(stream.clone(), Seq::from_raw(2), LogOffset::from_raw(500), ts(3)),
            "tick",
        );
        assert!(log.insert(next).is_ok());
        assert_eq!(log.head(&stream), Some(Seq::from_raw(2)));
    }

    #[test]
    fn test_insert_rejects_genesis_seq() {
        let log = MemoryLog::new();
        let event = Event::new(
            EventMetadata::new(StreamId::new("s"), Seq::genesis(), LogOffset::zero(), ts(0)),
            "tick",
        );
        assert!(log.insert(event).is_err());
    }
}
