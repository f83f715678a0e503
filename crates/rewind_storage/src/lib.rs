//! REWIND Storage
//!
//! Checkpoints (materialized view states tagged with the sequence number
//! they reflect), the contract for reading them, and loaders that build
//! in-memory logs and checkpoint stores from JSON files.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod file;

pub use checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSource, InitialCheckpoint, MemoryCheckpointStore,
    NoCheckpoints,
};
pub use file::{CheckpointRecord, LogRecord, load_checkpoints, load_log};
