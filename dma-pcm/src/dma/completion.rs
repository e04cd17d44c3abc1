//! Completion messages from the hardware context into the core.
//!
//! The completion context never touches pool or engine state. It pushes the
//! identity of the finished buffer into a lock-free queue and the producer
//! side drains it at its next opportunity ([`TransferEngine::reap`]).
//!
//! # Contract
//!
//! - Any number of tokens may be outstanding, but never more than the queue
//!   capacity; the engine refuses submissions beyond that.
//! - [`CompletionToken::complete`] is safe to call from interrupt context: it
//!   does not allocate or block.
//!
//! [`TransferEngine::reap`]: super::TransferEngine::reap

use alloc::sync::Arc;
use crossbeam_queue::ArrayQueue;

use super::BufferId;

/// Producer-drained queue of finished buffer ids.
#[derive(Clone)]
pub struct CompletionQueue {
    inner: Arc<ArrayQueue<BufferId>>,
}

impl CompletionQueue {
    pub fn new(capacity: usize) -> Self {
        CompletionQueue {
            inner: Arc::new(ArrayQueue::new(capacity)),
        }
    }

    /// Create the token the channel fires when `id` has been transferred.
    pub fn token(&self, id: BufferId) -> CompletionToken {
        CompletionToken {
            id,
            queue: self.inner.clone(),
        }
    }

    /// Take the oldest completion, if any.
    pub fn pop(&self) -> Option<BufferId> {
        self.inner.pop()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// One-shot completion callback attached to a submitted descriptor.
#[derive(Debug)]
pub struct CompletionToken {
    id: BufferId,
    queue: Arc<ArrayQueue<BufferId>>,
}

impl CompletionToken {
    /// The buffer this token completes.
    pub fn buffer_id(&self) -> BufferId {
        self.id
    }

    /// Report the transfer as finished.
    pub fn complete(self) {
        if let Err(id) = self.queue.push(self.id) {
            log::error!("completion queue full, dropping completion of {id:?}");
        }
    }
}
