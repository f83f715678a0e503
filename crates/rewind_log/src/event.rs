//! Event types for the event log.
//!
//! Events are immutable once appended. The replay path reads them, never
//! rewrites them.

use crate::index::EventIndexEntry;
use chrono::{DateTime, Utc};
use rewind_core::{CoreResult, Hash, LogOffset, Seq, StreamId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Position and provenance of an event in its stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Stream the event belongs to
    pub stream: StreamId,
    /// Sequence number, the ordering authority
    pub seq: Seq,
    /// Log offset, used only to locate targets
    pub offset: LogOffset,
    /// Wall-clock time of the producer; advisory, may skew
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Create event metadata
    #[must_use]
    pub fn new(stream: StreamId, seq: Seq, offset: LogOffset, timestamp: DateTime<Utc>) -> Self {
        Self {
            stream,
            seq,
            offset,
            timestamp,
        }
    }

    /// Index entry describing this position
    #[must_use]
    pub fn index_entry(&self) -> EventIndexEntry {
        EventIndexEntry {
            seq: self.seq,
            offset: self.offset,
            timestamp: self.timestamp,
        }
    }
}

/// A domain event as read from the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Position and origin of the event
    pub metadata: EventMetadata,
    /// Payload-kind discriminator, e.g. `"item_added"`
    pub kind: String,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
    /// BLAKE3 digest of `payload`
    pub payload_hash: Hash,
}

impl Event {
    /// Event with an empty payload
    pub fn new(metadata: EventMetadata, kind: impl Into<String>) -> Self {
        Self {
            metadata,
            kind: kind.into(),
            payload: Vec::new(),
            payload_hash: Hash::compute(&[]),
        }
    }

    /// Replace the payload and its hash
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload_hash = Hash::compute(&payload);
        self.payload = payload;
        self
    }

    /// Attach a JSON-encoded payload
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be encoded
    pub fn with_json_payload<T: Serialize>(self, payload: &T) -> CoreResult<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(self.with_payload(bytes))
    }

    /// Decode the payload as JSON into `T`
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid JSON for `T`
    pub fn decode_payload<T: DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Sequence number within the stream
    #[must_use]
    pub fn seq(&self) -> Seq {
        self.metadata.seq
    }

    /// Position in the log
    #[must_use]
    pub fn offset(&self) -> LogOffset {
        self.metadata.offset
    }

    /// Wall-clock time the event was recorded
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.metadata.timestamp
    }

    /// Payload kind
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether the stored payload hash still matches the payload
    #[must_use]
    pub fn verify_payload(&self) -> bool {
        self.payload_hash.verify(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(seq: u64) -> EventMetadata {
        EventMetadata::new(
            StreamId::new("order-1"),
            Seq::from_raw(seq),
            LogOffset::from_raw(seq * 100),
            DateTime::from_timestamp(1_700_000_000 + seq as i64, 0).unwrap(),
        )
    }

    #[test]
    fn test_event_creation() {
        let event = Event::new(meta(1), "order_placed");
        assert_eq!(event.kind(), "order_placed");
        assert_eq!(event.seq(), Seq::from_raw(1));
        assert_eq!(event.offset(), LogOffset::from_raw(100));
        assert!(event.payload.is_empty());
        assert!(event.verify_payload());
    }

    #[test]
    fn test_event_with_payload() {
        let event = Event::new(meta(2), "item_added").with_payload(b"data".to_vec());
        assert_eq!(event.payload, b"data");
        assert!(event.verify_payload());
    }

    #[test]
    fn test_event_json_payload() {
        let event = Event::new(meta(3), "item_added")
            .with_json_payload(&json!({"sku": "A-1", "qty": 2}))
            .unwrap();
        let decoded: serde_json::Value = event.decode_payload().unwrap();
        assert_eq!(decoded["qty"], 2);
    }

    #[test]
    fn test_event_decode_payload_error() {
        let event = Event::new(meta(4), "item_added").with_payload(b"not json".to_vec());
        assert!(event.decode_payload::<serde_json::Value>().is_err());
    }

    #[test]
    fn test_index_entry_from_metadata() {
        let m = meta(5);
        let entry = m.index_entry();
        assert_eq!(entry.seq, m.seq);
        assert_eq!(entry.offset, m.offset);
        assert_eq!(entry.timestamp, m.timestamp);
    }
}
