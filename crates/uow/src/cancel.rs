//! Cooperative cancellation for reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::{RepoError, RepoResult};

/// A shared flag a caller can trip to abandon pending reads.
///
/// Reads check the flag before their store round trip; a read already in
/// flight is not interrupted. Commits never consult it.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`RepoError::Cancelled`] if the signal has been tripped.
    pub(crate) fn check(&self, operation: &'static str) -> RepoResult<()> {
        if self.is_cancelled() {
            debug!("{} cancelled before reaching the store", operation);
            return Err(RepoError::Cancelled);
        }
        Ok(())
    }
}
