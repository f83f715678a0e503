//! Shared test fixtures: a small ledger view and instrumented sources.

use crate::engine::ReplayEngine;
use crate::view::FoldSet;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rewind_core::{CoreResult, Seq, StreamId};
use rewind_log::{Event, EventIndex, EventMetadata, EventSource, IndexSource, MemoryLog};
use rewind_storage::{CheckpointSource, InitialCheckpoint, NoCheckpoints};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub balance: i64,
    pub entries: u64,
}

impl Ledger {
    pub fn with_balance(balance: i64, entries: u64) -> Self {
        Self { balance, entries }
    }
}

#[derive(Serialize, Deserialize)]
struct Amount {
    amount: i64,
}

fn amount(event: &Event) -> i64 {
    event.decode_payload::<Amount>().map(|a| a.amount).unwrap_or(0)
}

pub fn deposit(ledger: &Ledger, event: &Event) -> Ledger {
    Ledger::with_balance(ledger.balance + amount(event), ledger.entries + 1)
}

fn withdraw(ledger: &Ledger, event: &Event) -> Ledger {
    Ledger::with_balance(ledger.balance - amount(event), ledger.entries + 1)
}

pub fn ledger_view() -> FoldSet<Ledger> {
    FoldSet::new("ledger", Ledger::default())
        .on("deposited", |l: &Ledger, e: &Event, _: &EventMetadata| deposit(l, e))
        .on("withdrawn", |l: &Ledger, e: &Event, _: &EventMetadata| withdraw(l, e))
}

pub fn stream() -> StreamId {
    StreamId::new("ledger-1")
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

/// Append with the timestamp `ts(n)` where `n` is the stream's length
pub fn append(log: &MemoryLog, kind: &str, amount: i64) -> EventMetadata {
    let at = ts(log.len(&stream()) as i64);
    log.append_json(&stream(), kind, &Amount { amount }, at).unwrap()
}

/// Positive amounts are deposits, negative ones withdrawals. Returns the
/// log and each event's offset.
pub fn ledger_log(amounts: &[i64]) -> (Arc<MemoryLog>, Vec<u64>) {
    let log = Arc::new(MemoryLog::new());
    let offsets = amounts
        .iter()
        .map(|n| {
            let kind = if *n < 0 { "withdrawn" } else { "deposited" };
            append(&log, kind, n.abs()).offset.as_u64()
        })
        .collect();
    (log, offsets)
}

pub fn engine(
    log: Arc<MemoryLog>,
    checkpoints: Arc<dyn CheckpointSource<Ledger>>,
) -> ReplayEngine<FoldSet<Ledger>> {
    ReplayEngine::from_log(ledger_view(), log, checkpoints)
}

#[derive(Debug, Default)]
pub struct Calls {
    count: AtomicUsize,
    seqs: Mutex<Vec<Seq>>,
}

impl Calls {
    fn hit(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Sequence numbers of every event handed out
    pub fn folded_seqs(&self) -> Vec<Seq> {
        self.seqs.lock().unwrap().clone()
    }
}

struct Counting<T> {
    inner: T,
    calls: Arc<Calls>,
}

#[async_trait]
impl<T: EventSource> EventSource for Counting<T> {
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>> {
        self.calls.hit();
        let events = self
            .inner
            .events_in_range(stream, from_exclusive, to_inclusive)
            .await?;
        self.calls
            .seqs
            .lock()
            .unwrap()
            .extend(events.iter().map(Event::seq));
        Ok(events)
    }
}

#[async_trait]
impl<T: IndexSource> IndexSource for Counting<T> {
    async fn lookup_index(&self, stream: &StreamId) -> CoreResult<Arc<EventIndex>> {
        self.calls.hit();
        self.inner.lookup_index(stream).await
    }
}

#[async_trait]
impl CheckpointSource<Ledger> for Counting<NoCheckpoints> {
    async fn nearest_checkpoint(
        &self,
        stream: &StreamId,
        at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<Ledger>>> {
        self.calls.hit();
        self.inner.nearest_checkpoint(stream, at_or_before).await
    }
}

pub fn counting_events(log: Arc<MemoryLog>) -> (Arc<dyn EventSource>, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let source: Arc<dyn EventSource> = Arc::new(Counting {
        inner: log,
        calls: Arc::clone(&calls),
    });
    (source, calls)
}

pub fn counting_index(log: Arc<MemoryLog>) -> (Arc<dyn IndexSource>, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let source: Arc<dyn IndexSource> = Arc::new(Counting {
        inner: log,
        calls: Arc::clone(&calls),
    });
    (source, calls)
}

pub fn counting_checkpoints() -> (Arc<dyn CheckpointSource<Ledger>>, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let source: Arc<dyn CheckpointSource<Ledger>> = Arc::new(Counting {
        inner: NoCheckpoints,
        calls: Arc::clone(&calls),
    });
    (source, calls)
}

/// Always answers with the same checkpoint, whatever the bound
pub struct StaticCheckpoint(InitialCheckpoint<Ledger>);

impl StaticCheckpoint {
    pub fn new(checkpoint: InitialCheckpoint<Ledger>) -> Self {
        Self(checkpoint)
    }
}

#[async_trait]
impl CheckpointSource<Ledger> for StaticCheckpoint {
    async fn nearest_checkpoint(
        &self,
        _stream: &StreamId,
        _at_or_before: Seq,
    ) -> CoreResult<Option<InitialCheckpoint<Ledger>>> {
        Ok(Some(self.0.clone()))
    }
}

/// Event source that has lost everything after `limit`
pub struct TruncatedEvents {
    log: Arc<MemoryLog>,
    limit: Seq,
}

impl TruncatedEvents {
    pub fn new(log: Arc<MemoryLog>, limit: Seq) -> Self {
        Self { log, limit }
    }
}

#[async_trait]
impl EventSource for TruncatedEvents {
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>> {
        if from_exclusive >= self.limit {
            return Ok(Vec::new());
        }
        self.log
            .events_in_range(stream, from_exclusive, to_inclusive.min(self.limit))
            .await
    }
}

/// Event source that never returns the event at `missing`
pub struct HoleyEvents {
    log: Arc<MemoryLog>,
    missing: Seq,
}

impl HoleyEvents {
    pub fn new(log: Arc<MemoryLog>, missing: Seq) -> Self {
        Self { log, missing }
    }
}

#[async_trait]
impl EventSource for HoleyEvents {
    async fn events_in_range(
        &self,
        stream: &StreamId,
        from_exclusive: Seq,
        to_inclusive: Seq,
    ) -> CoreResult<Vec<Event>> {
        let mut events = self
            .log
            .events_in_range(stream, from_exclusive, to_inclusive)
            .await?;
        events.retain(|event| event.seq() != self.missing);
        Ok(events)
    }
}
