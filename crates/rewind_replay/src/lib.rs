//! REWIND Replay Engine
//!
//! Reconstructs a view's state at any point of its event history, steps
//! through that history one event at a time, and produces stable,
//! path-addressed diffs between reconstructed states.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod document;
pub mod engine;
pub mod path;
pub mod stepper;
pub mod view;

#[cfg(test)]
mod fixtures;

pub use diff::{ChangeKind, DiffEngine, DiffEntry, DiffOptions, DiffSummary, StateDiff, diff};
pub use document::{DocumentEvent, DocumentView};
pub use engine::{ReplayConfig, ReplayEngine, ReplayOptions, ReplayOutcome};
pub use path::{PathPattern, PathSegment};
pub use stepper::{Step, StepResult, Stepper, StepperOptions};
pub use view::{FoldFn, FoldSet, View};
