use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::errors::SwapError;

/// Admits one job at a time. The permit is held from configuration until the
/// result is packaged. At most `max_waiting` jobs may wait behind it.
#[derive(Clone)]
pub struct JobSlot {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_waiting: usize,
}

pub struct JobPermit {
    _permit: OwnedSemaphorePermit,
}

/// A place in the wait queue, released on drop.
pub struct QueueTicket {
    waiting: Arc<AtomicUsize>,
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

/// What admission handed a job: the slot itself, or a place in line for it.
pub enum SlotClaim {
    Held(JobPermit),
    Waiting(QueueTicket),
}

impl JobSlot {
    pub fn new(max_waiting: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_waiting,
        }
    }

    pub fn try_acquire(&self) -> Result<JobPermit, SwapError> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map(|permit| JobPermit { _permit: permit })
            .map_err(|_| SwapError::Busy)
    }

    /// Reserves a place in the wait queue, or `Busy` when it is full.
    pub fn try_enqueue(&self) -> Result<QueueTicket, SwapError> {
        self.waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |waiting| {
                (waiting < self.max_waiting).then_some(waiting + 1)
            })
            .map(|_| QueueTicket {
                waiting: self.waiting.clone(),
            })
            .map_err(|_| SwapError::Busy)
    }

    /// Waits until the running job releases the slot.
    pub async fn acquire(&self) -> Result<JobPermit, SwapError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map(|permit| JobPermit { _permit: permit })
            .map_err(|_| SwapError::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}
