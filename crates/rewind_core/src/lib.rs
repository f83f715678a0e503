//! REWIND Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! All types are serializable with stable, cross-platform encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod coord;
pub mod error;
pub mod hash;
pub mod id;

// Re-exports
pub use cancel::{CancellationToken, check_cancelled, is_cancelled};
pub use coord::{LogOffset, Seq};
pub use error::{CoreError, CoreResult};
pub use hash::{Hash, HashError};
pub use id::StreamId;
