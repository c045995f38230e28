use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::thread::ThreadId;

/// Handle of a semaphore in the pool's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SemaphoreId(pub u32);

impl std::fmt::Display for SemaphoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemaphoreError {
    #[error("thread {thread} releases semaphore {semaphore} without holding a permit")]
    NotHeld {
        semaphore: SemaphoreId,
        thread: ThreadId,
    },

    #[error("no semaphore {0} in this pool")]
    Unknown(SemaphoreId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    /// No permit left; the thread is queued and has to be parked.
    Queued,
}

/// Counting semaphore with a FIFO wait queue.
///
/// A released permit goes straight to the longest waiting thread, which
/// becomes a holder without competing again.
#[derive(Debug, Clone)]
pub struct Semaphore {
    id: SemaphoreId,
    available: u32,
    holders: Vec<ThreadId>,
    waiting: VecDeque<ThreadId>,
}

impl Semaphore {
    pub fn new(id: SemaphoreId, permits: u32) -> Self {
        Self {
            id,
            available: permits,
            holders: Vec::new(),
            waiting: VecDeque::new(),
        }
    }

    pub fn id(&self) -> SemaphoreId {
        self.id
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn holders(&self) -> &[ThreadId] {
        &self.holders
    }

    pub fn acquire(&mut self, thread: ThreadId) -> Acquire {
        if self.available > 0 {
            self.available -= 1;
            self.holders.push(thread);
            Acquire::Granted
        } else {
            self.waiting.push_back(thread);
            Acquire::Queued
        }
    }

    /// Give back one permit of `thread`. Returns the waiter that received
    /// it, if any; the caller must re-admit that thread.
    pub fn release(&mut self, thread: ThreadId) -> Result<Option<ThreadId>, SemaphoreError> {
        let Some(position) = self.holders.iter().position(|&t| t == thread) else {
            return Err(SemaphoreError::NotHeld {
                semaphore: self.id,
                thread,
            });
        };
        self.holders.remove(position);

        match self.waiting.pop_front() {
            Some(next) => {
                self.holders.push(next);
                Ok(Some(next))
            }
            None => {
                self.available += 1;
                Ok(None)
            }
        }
    }
}
