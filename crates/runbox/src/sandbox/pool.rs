//! Bound on untrusted processes in flight
//!
//! Concurrent requests share one pool, so the worker never runs more than
//! `capacity` children at once regardless of how many jobs are active.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

use crate::sandbox::SandboxError;

/// Pool of process slots for concurrent execution
#[derive(Debug, Clone)]
pub struct ExecutionPool {
    /// Number of slots in the pool
    capacity: usize,

    /// Semaphore to limit concurrent processes
    semaphore: Arc<Semaphore>,
}

/// A held process slot, released on drop
#[derive(Debug)]
pub struct ProcessPermit {
    _permit: OwnedSemaphorePermit,
}

impl ExecutionPool {
    /// Create a new pool with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<ProcessPermit, SandboxError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SandboxError::PoolClosed)?;

        debug!(available = self.available(), "acquired process slot");
        Ok(ProcessPermit { _permit: permit })
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the total number of slots in the pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
