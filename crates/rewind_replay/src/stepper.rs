//! Forward stepping through a stream, one event per step.

use crate::engine::{ReplayEngine, ReplayOptions};
use crate::view::View;
use futures::Stream;
use rewind_core::{CancellationToken, CoreError, CoreResult, Seq, StreamId};
use rewind_log::Event;
use rewind_storage::InitialCheckpoint;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// State after one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult<S> {
    /// View state after the step
    pub state: S,
    /// Sequence number the state reflects
    pub index: Seq,
    /// Event folded by this step; `None` only for the seed
    pub event_applied: Option<Event>,
}

/// Outcome of [`Stepper::next`]
#[derive(Debug, Clone, PartialEq)]
pub enum Step<S> {
    /// The cursor moved forward by one event
    Advanced(StepResult<S>),
    /// No event follows the cursor
    EndOfStream,
}

impl<S> Step<S> {
    /// The step result, if the cursor moved
    #[must_use]
    pub fn advanced(self) -> Option<StepResult<S>> {
        match self {
            Self::Advanced(result) => Some(result),
            Self::EndOfStream => None,
        }
    }

    /// Whether this is the end-of-stream marker
    #[must_use]
    pub const fn is_end(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// Stepper options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepperOptions {
    /// Keep every visited result for backward lookups
    pub retain_history: bool,
}

#[derive(Debug)]
struct History<S> {
    results: Vec<StepResult<S>>,
    by_seq: HashMap<Seq, usize>,
}

impl<S> History<S> {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            by_seq: HashMap::new(),
        }
    }

    fn push(&mut self, result: StepResult<S>) {
        self.by_seq.insert(result.index, self.results.len());
        self.results.push(result);
    }

    fn get(&self, seq: Seq) -> Option<&StepResult<S>> {
        self.by_seq.get(&seq).map(|i| &self.results[*i])
    }
}

/// Cursor over a stream's history
///
/// Moves forward only. Each call to [`Stepper::next`] either advances by
/// exactly one event or leaves the cursor untouched.
pub struct Stepper<V: View> {
    engine: ReplayEngine<V>,
    stream: StreamId,
    current: StepResult<V::State>,
    pending: VecDeque<Event>,
    exhausted: bool,
    history: Option<History<V::State>>,
    cancel: CancellationToken,
}

impl<V: View> Stepper<V> {
    pub(crate) fn new(
        engine: ReplayEngine<V>,
        stream: StreamId,
        seed: InitialCheckpoint<V::State>,
        options: StepperOptions,
        cancel: CancellationToken,
    ) -> Self {
        let current = StepResult {
            state: seed.state,
            index: seed.index,
            event_applied: None,
        };
        let history = options.retain_history.then(|| {
            let mut history = History::new();
            history.push(current.clone());
            history
        });
        Self {
            engine,
            stream,
            current,
            pending: VecDeque::new(),
            exhausted: false,
            history,
            cancel,
        }
    }

    /// Stream being stepped
    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Result at the cursor
    #[must_use]
    pub fn current(&self) -> &StepResult<V::State> {
        &self.current
    }

    /// Whether end of stream has been reached
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fold the next event
    ///
    /// Once [`Step::EndOfStream`] is returned every later call returns it
    /// too.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the token has fired, and collaborator errors
    /// unchanged. The cursor does not move on error.
    pub async fn next(&mut self) -> CoreResult<Step<V::State>> {
        self.cancel.check()?;
        if self.pending.is_empty() {
            if self.exhausted {
                return Ok(Step::EndOfStream);
            }
            let page = self.fetch_next_page().await?;
            self.cancel.check()?;
            if page.is_empty() {
                tracing::debug!(stream = %self.stream, index = %self.current.index, "end of stream");
                self.exhausted = true;
                return Ok(Step::EndOfStream);
            }
            self.pending = page;
        }

        let Some(event) = self.pending.pop_front() else {
            return Ok(Step::EndOfStream);
        };
        let state = self.engine.fold_event(&self.current.state, &event);
        let result = StepResult {
            state,
            index: event.seq(),
            event_applied: Some(event),
        };
        tracing::trace!(stream = %self.stream, index = %result.index, "stepped");

        if let Some(history) = self.history.as_mut() {
            history.push(result.clone());
        }
        self.current = result.clone();
        Ok(Step::Advanced(result))
    }

    /// Result previously visited at `seq`; always `None` without retained
    /// history
    #[must_use]
    pub fn visited(&self, seq: Seq) -> Option<&StepResult<V::State>> {
        self.history.as_ref().and_then(|history| history.get(seq))
    }

    /// Result visited just before the cursor, when history is retained
    #[must_use]
    pub fn previous(&self) -> Option<&StepResult<V::State>> {
        let results = &self.history.as_ref()?.results;
        results.len().checked_sub(2).map(|i| &results[i])
    }

    /// State after the event at `seq`, for any `seq` up to the cursor
    ///
    /// Served from history when retained, otherwise by a fresh replay. The
    /// cursor never moves.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `seq` is past the cursor, and replay errors
    /// unchanged
    pub async fn state_at(&self, seq: Seq) -> CoreResult<StepResult<V::State>> {
        if seq > self.current.index {
            return Err(CoreError::out_of_range(format!(
                "seq {} is past the stepper cursor {}",
                seq, self.current.index
            )));
        }
        if seq == self.current.index {
            return Ok(self.current.clone());
        }
        if let Some(result) = self.visited(seq) {
            return Ok(result.clone());
        }

        let outcome = self
            .engine
            .replay_to_seq(&self.stream, seq, &ReplayOptions::default(), &self.cancel)
            .await?;
        // A replay seeded exactly at `seq` folds nothing
        let event_applied = match outcome.last_event {
            Some(event) => Some(event),
            None if !outcome.reached.is_genesis() => {
                let event = self.engine.event_at(&self.stream, outcome.reached).await?;
                self.cancel.check()?;
                event
            }
            None => None,
        };
        Ok(StepResult {
            state: outcome.state,
            index: outcome.reached,
            event_applied,
        })
    }

    /// Adapt the stepper into a stream of step results
    ///
    /// The stream ends at end of stream, or right after yielding an error.
    pub fn into_stream(self) -> impl Stream<Item = CoreResult<StepResult<V::State>>> {
        futures::stream::unfold(Some(self), |stepper| async move {
            let mut stepper = stepper?;
            match stepper.next().await {
                Ok(Step::Advanced(result)) => Some((Ok(result), Some(stepper))),
                Ok(Step::EndOfStream) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    async fn fetch_next_page(&self) -> CoreResult<VecDeque<Event>> {
        let index = self.engine.lookup_index(&self.stream).await?;
        self.cancel.check()?;
        let Some(head) = index.head() else {
            return Ok(VecDeque::new());
        };
        if head <= self.current.index {
            return Ok(VecDeque::new());
        }

        match self
            .engine
            .fetch_page(&self.stream, &index, self.current.index, head)
            .await?
        {
            Some(page) if page.events.is_empty() => Err(CoreError::RangeUnavailable {
                stream: self.stream.clone(),
                from: self.current.index,
                to: page.end,
            }),
            Some(page) => Ok(page.events.into()),
            None => Ok(VecDeque::new()),
        }
    }
}

impl<V: View> std::fmt::Debug for Stepper<V>
where
    V::State: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stepper")
            .field("stream", &self.stream)
            .field("index", &self.current.index)
            .field("pending", &self.pending.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
