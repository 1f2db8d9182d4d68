//! Cooperative cancellation for long tracking runs.
//!
//! The token is checked at revision-pair boundaries and between progressive
//! matching passes; there is no per-candidate cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::errors::{CloneTraceError, Result};

/// Cloneable cancellation handle shared between a tracking run and its
/// controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Fail with [`CloneTraceError::Cancelled`] when cancellation has been
    /// requested.
    pub fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(CloneTraceError::cancelled(stage));
        }
        Ok(())
    }
}
