//! Transfer buffers and the two-slot pool that fills them.
//!
//! A [`TransferBuffer`] is exclusively owned at every point in its life:
//!
//! ```text
//!   alloc ──► Spare ──promote──► Filling ──submit──► Submitted ──complete──► Completed (dropped)
//!   (pool)    (pool)             (pool)              (engine)
//! ```
//!
//! Ownership moves from the [`BufferPool`] to the [`TransferEngine`] at submit
//! and never comes back: a completed or abandoned buffer is dropped, which
//! releases its coherent memory.
//!
//! [`TransferEngine`]: crate::dma::TransferEngine

pub mod pool;

pub use pool::{BufferPool, PoolStats};

use crate::dma::{BufferId, CoherentMemory, PhysAddr};

/// Lifecycle state of a [`TransferBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Pre-allocated, waiting to be promoted.
    Spare,
    /// Being written by the producer.
    Filling,
    /// Owned by the hardware, transfer pending or running.
    Submitted,
    /// Transfer finished; about to be released.
    Completed,
}

/// A block of coherent memory with its identity and lifecycle state.
pub struct TransferBuffer<M> {
    id: BufferId,
    memory: M,
    state: BufferState,
}

impl<M: CoherentMemory> TransferBuffer<M> {
    pub(crate) fn new(id: BufferId, memory: M) -> Self {
        TransferBuffer {
            id,
            memory,
            state: BufferState::Spare,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: BufferState) {
        self.state = state;
    }

    pub fn phys_addr(&self) -> PhysAddr {
        self.memory.phys_addr()
    }

    /// Size of the backing memory in bytes.
    pub fn capacity(&self) -> usize {
        self.memory.as_ref().len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.memory.as_ref()
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.memory.as_mut()
    }
}

impl<M> Drop for TransferBuffer<M> {
    fn drop(&mut self) {
        log::debug!("releasing {:?} ({:?})", self.id, self.state);
    }
}

impl<M> core::fmt::Debug for TransferBuffer<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
