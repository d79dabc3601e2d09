use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::EngineError;

/// Seconds a turned-away caller is told to wait before retrying.
const RETRY_AFTER_SECS: u64 = 1;

/// Caps how many sandboxes run at once on this host.
///
/// A request waits up to `max_wait` for a slot and is then turned away
/// with `EngineError::Busy`. The permit is held for the whole provision,
/// run and dispose sequence.
#[derive(Clone)]
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    capacity: usize,
    max_wait: Duration,
}

impl AdmissionGate {
    /// `capacity == 0` disables the cap.
    pub fn new(capacity: usize, max_wait: Duration) -> Self {
        let capacity = if capacity == 0 {
            Semaphore::MAX_PERMITS
        } else {
            capacity
        };
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            max_wait,
        }
    }

    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, EngineError> {
        let busy = || EngineError::Busy {
            retry_after_secs: RETRY_AFTER_SECS,
        };
        match tokio::time::timeout(self.max_wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(busy()),
            Err(_elapsed) => Err(busy()),
        }
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }
}
