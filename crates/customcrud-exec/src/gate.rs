use std::{future::Future, sync::Arc};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::CancellationToken;

/// Counting gate bounding how many hook phases run at once.
///
/// A capacity of zero means unlimited. Clones share the same permits.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    semaphore: Option<Arc<Semaphore>>,
    capacity: u32,
}

/// Held for the duration of one phase; dropping it releases the slot.
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyGate {
    pub fn new(capacity: u32) -> Self {
        let semaphore = (capacity > 0).then(|| Arc::new(Semaphore::new(capacity as usize)));
        Self {
            semaphore,
            capacity,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured capacity, `None` when unlimited.
    pub fn capacity(&self) -> Option<u32> {
        self.semaphore.as_ref().map(|_| self.capacity)
    }

    pub fn available_permits(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|semaphore| semaphore.available_permits())
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> GatePermit {
        let permit = match &self.semaphore {
            // The semaphore is never closed, so acquisition only fails if it is.
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        };
        GatePermit { _permit: permit }
    }

    /// Like [`acquire`](Self::acquire) but gives up with `None` once `cancel`
    /// fires, including while still queued behind other holders.
    pub async fn acquire_or_cancel(&self, cancel: &CancellationToken) -> Option<GatePermit> {
        if cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = self.acquire() => Some(permit),
        }
    }

    /// Runs `work` while holding a slot.
    pub async fn run<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        let _permit = self.acquire().await;
        work.await
    }
}
