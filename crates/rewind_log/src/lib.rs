//! REWIND Event Log
//!
//! Immutable event records, the sequence index used to locate replay
//! targets, and the narrow contracts through which the replay engine reads
//! events from external storage.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod index;
pub mod memory;
pub mod source;
pub mod target;

pub use event::{Event, EventMetadata};
pub use index::{EventIndex, EventIndexEntry, IndexRange};
pub use memory::MemoryLog;
pub use source::{EventSource, IndexSource};
pub use target::{ReplayTarget, TargetBounds};
