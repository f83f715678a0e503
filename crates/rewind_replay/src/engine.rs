//! Replay engine for reconstructing view state at a point in history.
//!
//! A replay resolves its target through the stream index, seeds from the
//! nearest checkpoint at or before the resolved sequence number, and folds
//! the remaining events in `seq` order. Events are fetched a page at a time
//! so a long stream is never held in memory at once.

use crate::stepper::{Stepper, StepperOptions};
use crate::view::View;
use rewind_core::{CancellationToken, CoreError, CoreResult, Hash, Seq, StreamId};
use rewind_log::{
    Event, EventIndex, EventIndexEntry, EventSource, IndexSource, MemoryLog, ReplayTarget,
};
use rewind_storage::{CheckpointSource, InitialCheckpoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Folds between cancellation checks when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Events requested from the source per fetch
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Folds between cancellation checks, unless a call overrides it
    pub default_batch_size: usize,
    /// Events requested from the event source per fetch
    pub page_size: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Per-call replay options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Folds between cancellation checks; falls back to
    /// [`ReplayConfig::default_batch_size`]
    pub batch_size: Option<usize>,
}

impl ReplayOptions {
    /// Options with an explicit batch size
    #[must_use]
    pub const fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: Some(batch_size),
        }
    }
}

/// Result of a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome<S> {
    /// Reconstructed view state
    pub state: S,
    /// Last sequence number reflected in `state`
    pub reached: Seq,
    /// Sequence number the target resolved to; `None` when the target
    /// precedes the first event
    pub requested: Option<Seq>,
    /// The target lay past the last available event
    pub beyond_head: bool,
    /// Checkpoint the replay started from, if any
    pub seeded_from: Option<Seq>,
    /// Number of events folded
    pub folded: u64,
    /// Last event folded
    pub last_event: Option<Event>,
}

impl<S> ReplayOutcome<S> {
    fn initial(state: S, requested: Option<Seq>, beyond_head: bool) -> Self {
        Self {
            state,
            reached: Seq::genesis(),
            requested,
            beyond_head,
            seeded_from: None,
            folded: 0,
            last_event: None,
        }
    }

    /// Whether the replay landed exactly on the resolved target
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.beyond_head && self.requested.is_none_or(|seq| seq == self.reached)
    }

    /// Turn the outcome into a checkpoint at `reached`
    #[must_use]
    pub fn into_checkpoint(self) -> InitialCheckpoint<S> {
        InitialCheckpoint::new(self.state, self.reached)
    }
}

impl<S: Serialize> ReplayOutcome<S> {
    /// Fingerprint of the reconstructed state
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be encoded
    pub fn fingerprint(&self) -> CoreResult<Hash> {
        Hash::of_json(&self.state)
    }
}

/// Replays a view over one event log
///
/// Cloning is cheap: collaborators are shared.
pub struct ReplayEngine<V: View> {
    view: Arc<V>,
    events: Arc<dyn EventSource>,
    index: Arc<dyn IndexSource>,
    checkpoints: Arc<dyn CheckpointSource<V::State>>,
    config: ReplayConfig,
}

impl<V: View> Clone for ReplayEngine<V> {
    fn clone(&self) -> Self {
        Self {
            view: Arc::clone(&self.view),
            events: Arc::clone(&self.events),
            index: Arc::clone(&self.index),
            checkpoints: Arc::clone(&self.checkpoints),
            config: self.config.clone(),
        }
    }
}

impl<V: View> fmt::Debug for ReplayEngine<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayEngine")
            .field("view", &self.view.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<V: View> ReplayEngine<V> {
    /// Create an engine over separate event, index and checkpoint sources
    pub fn new(
        view: V,
        events: Arc<dyn EventSource>,
        index: Arc<dyn IndexSource>,
        checkpoints: Arc<dyn CheckpointSource<V::State>>,
    ) -> Self {
        Self {
            view: Arc::new(view),
            events,
            index,
            checkpoints,
            config: ReplayConfig::default(),
        }
    }

    /// Create an engine reading events and index from one in-memory log
    pub fn from_log(
        view: V,
        log: Arc<MemoryLog>,
        checkpoints: Arc<dyn CheckpointSource<V::State>>,
    ) -> Self {
        let events: Arc<dyn EventSource> = log.clone();
        Self::new(view, events, log, checkpoints)
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// The view being replayed
    #[must_use]
    pub fn view(&self) -> &V {
        &self.view
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Reconstruct the view state as of `target`
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the token fires, and collaborator errors
    /// unchanged. A failed replay never yields partial state.
    pub async fn replay(
        &self,
        stream: &StreamId,
        target: ReplayTarget,
        options: &ReplayOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<ReplayOutcome<V::State>> {
        cancel.check()?;
        let index = self.index.lookup_index(stream).await?;
        cancel.check()?;

        let range = index.resolve(&target);
        tracing::debug!(
            %stream,
            %target,
            upper = ?range.upper,
            head = ?range.head,
            beyond_head = range.beyond_head,
            "target resolved"
        );

        match range.upper {
            Some(upper) => {
                self.fold_through(stream, &index, upper, range.beyond_head, options, cancel)
                    .await
            }
            None => Ok(ReplayOutcome::initial(
                self.view.initial_state(),
                None,
                range.beyond_head,
            )),
        }
    }

    /// Reconstruct the view state after the event at `seq`
    ///
    /// Sequence numbers missing from the index resolve to the greatest
    /// indexed one below them.
    ///
    /// # Errors
    ///
    /// Same as [`ReplayEngine::replay`]
    pub async fn replay_to_seq(
        &self,
        stream: &StreamId,
        seq: Seq,
        options: &ReplayOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<ReplayOutcome<V::State>> {
        cancel.check()?;
        let index = self.index.lookup_index(stream).await?;
        cancel.check()?;

        let beyond_head = index.head().is_some_and(|head| seq > head);
        match index.floor(seq) {
            Some(upper) => {
                self.fold_through(stream, &index, upper, beyond_head, options, cancel)
                    .await
            }
            None => Ok(ReplayOutcome::initial(
                self.view.initial_state(),
                None,
                beyond_head,
            )),
        }
    }

    /// Start a stepper at `seed`
    #[must_use]
    pub fn create_stepper(
        &self,
        stream: StreamId,
        seed: InitialCheckpoint<V::State>,
        options: StepperOptions,
        cancel: CancellationToken,
    ) -> Stepper<V> {
        Stepper::new(self.clone(), stream, seed, options, cancel)
    }

    /// Replay to `target`, then start a stepper from the result
    ///
    /// # Errors
    ///
    /// Same as [`ReplayEngine::replay`]
    pub async fn stepper_at(
        &self,
        stream: StreamId,
        target: ReplayTarget,
        options: StepperOptions,
        cancel: CancellationToken,
    ) -> CoreResult<Stepper<V>> {
        let outcome = self
            .replay(&stream, target, &ReplayOptions::default(), &cancel)
            .await?;
        Ok(self.create_stepper(stream, outcome.into_checkpoint(), options, cancel))
    }

    pub(crate) async fn lookup_index(&self, stream: &StreamId) -> CoreResult<Arc<EventIndex>> {
        self.index.lookup_index(stream).await
    }

    /// The event stored at `seq`, if the source has it
    pub(crate) async fn event_at(&self, stream: &StreamId, seq: Seq) -> CoreResult<Option<Event>> {
        let Some(before) = seq.as_u64().checked_sub(1) else {
            return Ok(None);
        };
        let events = self
            .events
            .events_in_range(stream, Seq::from_raw(before), seq)
            .await?;
        Ok(events.into_iter().find(|event| event.seq() == seq))
    }

    pub(crate) fn page_size(&self) -> usize {
        self.config.page_size.max(1)
    }

    pub(crate) fn fold_event(&self, state: &V::State, event: &Event) -> V::State {
        match self.view.fold(state, event) {
            Some(next) => next,
            None => {
                tracing::trace!(seq = %event.seq(), kind = event.kind(), "unhandled kind");
                state.clone()
            }
        }
    }

    /// Fetch one page of events after `after`, no further than `upper`
    ///
    /// Returns `Ok(None)` when the index holds nothing in that range.
    pub(crate) async fn fetch_page(
        &self,
        stream: &StreamId,
        index: &EventIndex,
        after: Seq,
        upper: Seq,
    ) -> CoreResult<Option<Page>> {
        let expected = page_entries(index, after, upper, self.page_size());
        let Some(end) = expected.last().map(|entry| entry.seq) else {
            return Ok(None);
        };
        let events = self.events.events_in_range(stream, after, end).await?;
        check_page(stream, after, end, expected, &events)?;
        let short = events.len() < expected.len();
        tracing::debug!(%stream, from = %after, to = %end, fetched = events.len(), short, "page fetched");
        Ok(Some(Page { end, events, short }))
    }

    async fn seed(&self, stream: &StreamId, upper: Seq) -> CoreResult<InitialCheckpoint<V::State>> {
        match self.checkpoints.nearest_checkpoint(stream, upper).await? {
            Some(checkpoint) if checkpoint.index <= upper => {
                tracing::debug!(%stream, index = %checkpoint.index, "seeded from checkpoint");
                Ok(checkpoint)
            }
            Some(checkpoint) => {
                tracing::warn!(
                    %stream,
                    index = %checkpoint.index,
                    %upper,
                    "ignoring checkpoint past the replay target"
                );
                Ok(InitialCheckpoint::genesis(self.view.initial_state()))
            }
            None => Ok(InitialCheckpoint::genesis(self.view.initial_state())),
        }
    }

    async fn fold_through(
        &self,
        stream: &StreamId,
        index: &EventIndex,
        upper: Seq,
        beyond_head: bool,
        options: &ReplayOptions,
        cancel: &CancellationToken,
    ) -> CoreResult<ReplayOutcome<V::State>> {
        let seed = self.seed(stream, upper).await?;
        cancel.check()?;
        tracing::debug!(
            %stream,
            from = %seed.index,
            %upper,
            span = seed.index.distance_to(upper),
            "folding"
        );

        let batch_size = options
            .batch_size
            .unwrap_or(self.config.default_batch_size)
            .max(1) as u64;
        let seeded_from = (!seed.index.is_genesis()).then_some(seed.index);
        let mut state = seed.state;
        let mut reached = seed.index;
        let mut fetched = seed.index;
        let mut folded = 0u64;
        let mut last_event = None;

        while fetched < upper {
            let Some(page) = self.fetch_page(stream, index, fetched, upper).await? else {
                break;
            };
            cancel.check()?;

            for event in page.events {
                if folded % batch_size == 0 {
                    cancel.check()?;
                }
                tracing::trace!(seq = %event.seq(), kind = event.kind(), "fold");
                state = self.fold_event(&state, &event);
                reached = event.seq();
                folded += 1;
                last_event = Some(event);
            }
            if page.short {
                tracing::debug!(%stream, %reached, %upper, "event source ends before index");
                break;
            }
            fetched = page.end;
        }

        tracing::debug!(%stream, %reached, folded, "replay complete");
        Ok(ReplayOutcome {
            state,
            reached,
            requested: Some(upper),
            beyond_head: beyond_head || reached < upper,
            seeded_from,
            folded,
            last_event,
        })
    }
}

/// One fetch from the event source
///
/// `events` matches a prefix of the index entries in `(after, end]`. A short
/// page means the source holds nothing past its last event.
#[derive(Debug)]
pub(crate) struct Page {
    pub(crate) end: Seq,
    pub(crate) events: Vec<Event>,
    pub(crate) short: bool,
}

/// Index entries of the page that starts after `after`
///
/// Pages are counted in index entries, so gaps in sequence numbering never
/// produce empty fetches.
fn page_entries(index: &EventIndex, after: Seq, upper: Seq, page_size: usize) -> &[EventIndexEntry] {
    let entries = index.entries();
    let start = entries.partition_point(|e| e.seq <= after);
    let stop = entries.partition_point(|e| e.seq <= upper).max(start);
    &entries[start..stop.min(start.saturating_add(page_size))]
}

/// Events must line up with the index entries they were fetched for. A
/// missing event is only allowed at the tail.
fn check_page(
    stream: &StreamId,
    after: Seq,
    end: Seq,
    expected: &[EventIndexEntry],
    events: &[Event],
) -> CoreResult<()> {
    let unavailable = || CoreError::RangeUnavailable {
        stream: stream.clone(),
        from: after,
        to: end,
    };
    if events.len() > expected.len() {
        return Err(unavailable());
    }
    if events
        .iter()
        .zip(expected)
        .any(|(event, entry)| event.seq() != entry.seq)
    {
        return Err(unavailable());
    }
    Ok(())
}
