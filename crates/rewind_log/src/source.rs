//! Read contracts for external event storage.
//!
//! Storage adapters implement these; the replay engine only ever reads
//! through them. Failures are surfaced unchanged and never retried here.

use crate::event::Event;
use crate::index::EventIndex;
use async_trait::async_trait;
use rewind_core::{CoreResult, Seq, StreamId};
use std::sync::Arc;

/// Source of events by sequence range
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events with `from_exclusive < seq <= to_inclusive`, in strictly
    /// increasing `seq` order with no gaps
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` or `RangeUnavailable` when the range cannot
    /// be served
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>>;
}

/// Source of a stream's sequence index
#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Current index of `stream`
    ///
    /// # Errors
    ///
    /// Returns `StreamNotFound` if the stream is unknown
    async fn lookup_index(&self, stream: &StreamId) -> CoreResult<Arc<EventIndex>>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>> {
        (**self)
            .events_in_range(stream, from_exclusive, to_inclusive)
            .await
    }
}

#[async_trait]
impl<T: IndexSource + ?Sized> IndexSource for Arc<T> {
    async fn lookup_index(&self, stream: &StreamId) -> CoreResult<Arc<EventIndex>> {
        (**self).lookup_index(stream).await
    }
}
