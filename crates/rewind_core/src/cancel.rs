//! Cooperative cancellation.
//!
//! A caller sets the token; long-running operations observe it only at their
//! documented step boundaries. Nothing here polls a clock or spawns a task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, CoreResult};

/// Shared cancellation token checked between fold steps.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`CoreError::Cancelled`] if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the token is set
    pub fn check(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Whether `token` is in the cancelled state.
#[must_use]
pub fn is_cancelled(token: &CancellationToken) -> bool {
    token.is_cancelled()
}

/// Fail with [`CoreError::Cancelled`] when `token` is in the cancelled state.
///
/// # Errors
///
/// Returns `Cancelled` when the token is set
pub fn check_cancelled(token: &CancellationToken) -> CoreResult<()> {
    token.check()
}
