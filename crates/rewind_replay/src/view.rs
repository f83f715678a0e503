//! Views: the fold functions that turn events into state.

use indexmap::IndexMap;
use rewind_log::{Event, EventMetadata};
use std::fmt;
use std::sync::Arc;

/// A projection folded over one stream's events
///
/// Folds must be pure and deterministic: the same state and event always
/// give the same next state. Replay from a checkpoint relies on this.
pub trait View: Send + Sync {
    /// State produced by the view
    type State: Clone + Send + Sync + 'static;

    /// State before any event has been folded
    fn initial_state(&self) -> Self::State;

    /// Fold one event; `None` means the view does not handle this kind and
    /// the state is left unchanged
    fn fold(&self, state: &Self::State, event: &Event) -> Option<Self::State>;

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// One entry of a [`FoldSet`]
pub type FoldFn<S> = Arc<dyn Fn(&S, &Event, &EventMetadata) -> S + Send + Sync>;

/// Lookup table from payload kind to fold function
///
/// Kinds without an entry fold as the identity.
pub struct FoldSet<S> {
    name: String,
    initial: S,
    folds: IndexMap<String, FoldFn<S>>,
}

impl<S: Clone + Send + Sync + 'static> FoldSet<S> {
    /// Create an empty fold set
    #[must_use]
    pub fn new(name: impl Into<String>, initial: S) -> Self {
        Self {
            name: name.into(),
            initial,
            folds: IndexMap::new(),
        }
    }

    /// Register a fold for `kind`, builder style
    #[must_use]
    pub fn on<F>(mut self, kind: impl Into<String>, fold: F) -> Self
    where
        F: Fn(&S, &Event, &EventMetadata) -> S + Send + Sync + 'static,
    {
        self.register(kind, fold);
        self
    }

    /// Register a fold for `kind`, replacing any previous one
    pub fn register<F>(&mut self, kind: impl Into<String>, fold: F)
    where
        F: Fn(&S, &Event, &EventMetadata) -> S + Send + Sync + 'static,
    {
        self.folds.insert(kind.into(), Arc::new(fold));
    }

    /// Whether `kind` has a fold
    #[must_use]
    pub fn handles(&self, kind: &str) -> bool {
        self.folds.contains_key(kind)
    }

    /// Registered kinds, in registration order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.folds.keys().map(String::as_str)
    }
}

impl<S: Clone + Send + Sync + 'static> View for FoldSet<S> {
    type State = S;

    fn initial_state(&self) -> S {
        self.initial.clone()
    }

    fn fold(&self, state: &S, event: &Event) -> Option<S> {
        self.folds
            .get(event.kind())
            .map(|fold| fold(state, event, &event.metadata))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<S> fmt::Debug for FoldSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FoldSet")
            .field("name", &self.name)
            .field("kinds", &self.folds.keys().collect::<Vec<_>>())
            .finish()
    }
}
