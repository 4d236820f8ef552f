// Admission control module
// Bounded counting gate limiting simultaneously active connections

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ServerError;

/// Counting gate with `capacity` slots.
///
/// A slot is held by an [`AdmissionPermit`] and returned when the permit is
/// released or dropped, so every grant is paired with exactly one release.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// One granted admission slot
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Give the slot back
    pub fn release(self) {}
}

impl AdmissionController {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait up to `timeout` for a free slot.
    pub async fn try_acquire(&self, timeout: Duration) -> Result<AdmissionPermit, ServerError> {
        let denied = || ServerError::AdmissionTimeout {
            capacity: self.capacity,
            waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        // Fast path keeps the common case free of timer registration
        if let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() {
            return Ok(AdmissionPermit { _permit: permit });
        }

        match tokio::time::timeout(timeout, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(AdmissionPermit { _permit: permit }),
            // The semaphore is never closed, but a closed gate admits nobody
            Ok(Err(_)) | Err(_) => Err(denied()),
        }
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
