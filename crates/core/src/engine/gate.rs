//! Concurrency gate bounding how many jobs of one orchestrator run at once.

use crate::engine::error::{EngineError, EngineResult};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting semaphore shared by every job of one orchestrator.
///
/// Waiters are woken in arrival order. A slot is held by a [`GatePermit`]
/// and returned when the permit is dropped, on every exit path.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Proof of admission. Dropping it frees the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// A gate admitting `capacity` jobs at a time (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    ///
    /// Fails fast with [`EngineError::Cancelled`] if `token` fires while
    /// waiting, and with [`EngineError::GateClosed`] if the gate was closed.
    pub async fn acquire(&self, token: &CancellationToken) -> EngineResult<GatePermit> {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(EngineError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit
                .map(|permit| GatePermit { _permit: permit })
                .map_err(|_| EngineError::GateClosed),
        }
    }

    /// Refuse all future acquisitions. Jobs already admitted keep running.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available_permits())
    }
}
