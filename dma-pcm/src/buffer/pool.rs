//! The active/spare pair the producer writes encoded frames into.
//!
//! Writes land in the active buffer at the fill cursor. A buffer is handed to
//! the [`TransferEngine`] only once it is completely full, so every transfer
//! is exactly one pool capacity long.

use spin::Mutex;

use super::{BufferState, TransferBuffer};
use crate::dma::{BufferId, CoherentMemory, DmaChannel, TransferEngine};
use crate::error::{Error, Resource, Result};

/// Counters kept by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Active buffers that filled up and were handed to the engine.
    pub swaps: u64,
    /// Spare buffers allocated to replace a promoted one.
    pub reallocations: u64,
}

struct Slots<M> {
    active: Option<TransferBuffer<M>>,
    spare: Option<TransferBuffer<M>>,
    fill: usize,
    stats: PoolStats,
}

/// Two-slot arena of transfer buffers: one being filled, one standing by.
///
/// All mutation goes through a single lock, so the producer can never write
/// into a buffer at the moment it changes hands.
///
/// When the active buffer fills up the pool:
///
/// 1. promotes the spare to active and resets the fill cursor,
/// 2. submits the full buffer to the [`TransferEngine`] (ownership moves there),
/// 3. allocates a new spare.
///
/// If step 3 fails the swap still completes, but every later write fails with
/// [`Resource::SpareBuffer`] until [`replenish`](Self::replenish) succeeds.
pub struct BufferPool<M> {
    capacity: usize,
    slots: Mutex<Slots<M>>,
}

impl<M: CoherentMemory> BufferPool<M> {
    /// Allocate the active and spare buffers, `capacity` bytes each.
    pub fn open<C>(engine: &mut TransferEngine<C>, capacity: usize) -> Result<Self>
    where
        C: DmaChannel<Memory = M>,
    {
        let mut active = engine.alloc_buffer(capacity)?;
        let spare = engine.alloc_buffer(capacity).inspect_err(|_| {
            log::error!("spare allocation failed, releasing {:?}", active.id());
        })?;
        active.set_state(BufferState::Filling);

        log::info!(
            "buffer pool open: active {:?} at {}, spare {:?} at {}",
            active.id(),
            active.phys_addr(),
            spare.id(),
            spare.phys_addr()
        );

        Ok(BufferPool {
            capacity,
            slots: Mutex::new(Slots {
                active: Some(active),
                spare: Some(spare),
                fill: 0,
                stats: PoolStats::default(),
            }),
        })
    }

    /// Append encoded bytes to the active buffer, swapping whenever it fills.
    ///
    /// Returns the number of bytes accepted. On error the bytes after the
    /// failing swap are not written.
    pub fn write<C>(&self, engine: &mut TransferEngine<C>, mut bytes: &[u8]) -> Result<usize>
    where
        C: DmaChannel<Memory = M>,
    {
        let mut slots = self.slots.lock();
        if slots.spare.is_none() {
            return Err(Error::ResourceExhaustion(if slots.active.is_none() {
                Resource::TransferBuffer
            } else {
                Resource::SpareBuffer
            }));
        }

        let mut written = 0;
        while !bytes.is_empty() {
            let fill = slots.fill;
            let Some(active) = slots.active.as_mut() else {
                return Err(Error::ResourceExhaustion(Resource::TransferBuffer));
            };

            let n = (self.capacity - fill).min(bytes.len());
            active.as_bytes_mut()[fill..fill + n].copy_from_slice(&bytes[..n]);
            slots.fill += n;
            written += n;
            bytes = &bytes[n..];

            if slots.fill == self.capacity {
                self.swap(&mut slots, engine)?;
            }
        }
        Ok(written)
    }

    fn swap<C>(&self, slots: &mut Slots<M>, engine: &mut TransferEngine<C>) -> Result<()>
    where
        C: DmaChannel<Memory = M>,
    {
        let Some(mut next) = slots.spare.take() else {
            return Err(Error::ResourceExhaustion(Resource::SpareBuffer));
        };
        next.set_state(BufferState::Filling);
        let next_id = next.id();
        let Some(full) = slots.active.replace(next) else {
            return Err(Error::ResourceExhaustion(Resource::TransferBuffer));
        };
        slots.fill = 0;
        slots.stats.swaps += 1;
        log::debug!("{:?} full, promoted {:?}", full.id(), next_id);

        let submitted = engine.submit(full, self.capacity);

        match engine.alloc_buffer(self.capacity) {
            Ok(spare) => {
                slots.spare = Some(spare);
                slots.stats.reallocations += 1;
            }
            Err(_) => {
                log::error!("no spare buffer after swap, writes stall until replenished");
                return Err(Error::ResourceExhaustion(Resource::SpareBuffer));
            }
        }

        submitted.map(|_| ())
    }

    /// Drop the fill cursor to zero, keeping both buffers.
    pub fn reset(&self) {
        self.slots.lock().fill = 0;
    }

    /// Allocate whichever of the two buffers is missing.
    pub fn replenish<C>(&self, engine: &mut TransferEngine<C>) -> Result<()>
    where
        C: DmaChannel<Memory = M>,
    {
        let mut slots = self.slots.lock();
        if slots.active.is_none() {
            let mut active = engine.alloc_buffer(self.capacity)?;
            active.set_state(BufferState::Filling);
            slots.active = Some(active);
            slots.fill = 0;
        }
        if slots.spare.is_none() {
            slots.spare = Some(engine.alloc_buffer(self.capacity)?);
            slots.stats.reallocations += 1;
        }
        Ok(())
    }

    /// Release both buffers. Calling it again releases nothing.
    ///
    /// Returns the number of buffers released.
    pub fn close(&self) -> usize {
        let mut slots = self.slots.lock();
        let mut released = 0;
        if let Some(active) = slots.active.take() {
            log::debug!("releasing active {:?} ({} bytes filled)", active.id(), slots.fill);
            released += 1;
        }
        if let Some(spare) = slots.spare.take() {
            log::debug!("releasing spare {:?}", spare.id());
            released += 1;
        }
        slots.fill = 0;
        released
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes written into the active buffer since the last swap or reset.
    pub fn fill_level(&self) -> usize {
        self.slots.lock().fill
    }

    pub fn active_id(&self) -> Option<BufferId> {
        self.slots.lock().active.as_ref().map(TransferBuffer::id)
    }

    pub fn spare_id(&self) -> Option<BufferId> {
        self.slots.lock().spare.as_ref().map(TransferBuffer::id)
    }

    pub fn has_spare(&self) -> bool {
        self.slots.lock().spare.is_some()
    }

    pub fn stats(&self) -> PoolStats {
        self.slots.lock().stats
    }

    #[cfg(test)]
    pub(crate) fn active_bytes(&self) -> std::vec::Vec<u8> {
        let slots = self.slots.lock();
        slots
            .active
            .as_ref()
            .map(|b| b.as_bytes()[..slots.fill].to_vec())
            .unwrap_or_default()
    }
}
