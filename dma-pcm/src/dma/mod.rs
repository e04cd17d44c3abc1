//! Hardware transfer engine collaborator and its wrapper.
//!
//! The platform shell implements [`DmaChannel`] (and [`ChannelProvider`] to
//! hand one out) on top of whatever DMA API the target offers. Everything the
//! core needs from the hardware goes through these two traits:
//!
//! | Call | Context | Blocking |
//! |------|---------|----------|
//! | [`alloc_coherent`](DmaChannel::alloc_coherent) | producer | no |
//! | [`prep_slave_single`](DmaChannel::prep_slave_single) / [`submit`](DmaChannel::submit) | producer | no |
//! | [`issue_pending`](DmaChannel::issue_pending) | producer | no |
//! | [`terminate_sync`](DmaChannel::terminate_sync) | state transition | yes |
//! | [`CompletionToken::complete`] | completion (IRQ) | no |
//!
//! [`TransferEngine`] wraps one channel and owns every buffer the hardware is
//! reading from.

pub mod completion;
pub mod engine;

pub use completion::{CompletionQueue, CompletionToken};
pub use engine::{ChannelState, EngineStats, TransferEngine};

use alloc::boxed::Box;
use alloc::vec;
use core::fmt;

/// Bus address of a coherent memory block as seen by the DMA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Identity of one transfer buffer for the lifetime of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

/// Cookie returned by the channel for a submitted descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie(pub i32);

/// A prepared memory-to-device transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub phys: PhysAddr,
    pub len: usize,
}

/// A block of DMA-coherent memory.
///
/// Dropping the value releases the memory back to the platform.
pub trait CoherentMemory: AsRef<[u8]> + AsMut<[u8]> {
    fn phys_addr(&self) -> PhysAddr;
}

/// Heap-backed stand-in for coherent memory, for hosts where the bus address
/// is synthetic (simulation, tests).
pub struct HeapBlock {
    data: Box<[u8]>,
    phys: PhysAddr,
}

impl HeapBlock {
    pub fn zeroed(len: usize, phys: PhysAddr) -> Self {
        HeapBlock {
            data: vec![0u8; len].into_boxed_slice(),
            phys,
        }
    }
}

impl AsRef<[u8]> for HeapBlock {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for HeapBlock {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl CoherentMemory for HeapBlock {
    fn phys_addr(&self) -> PhysAddr {
        self.phys
    }
}

/// One memory-to-device DMA channel.
pub trait DmaChannel {
    /// Memory handed out by [`alloc_coherent`](Self::alloc_coherent).
    type Memory: CoherentMemory;

    /// Allocate `len` bytes of memory the channel can read from.
    ///
    /// Returns `None` when the platform is out of coherent memory.
    fn alloc_coherent(&mut self, len: usize) -> Option<Self::Memory>;

    /// Prepare a single-block transfer. `None` means the channel rejected the
    /// address or length.
    fn prep_slave_single(&mut self, phys: PhysAddr, len: usize) -> Option<Descriptor>;

    /// Queue a prepared descriptor. The channel keeps `done` and calls
    /// [`CompletionToken::complete`] from its completion context once the
    /// transfer finished. `None` means the queueing failed; `done` is dropped.
    fn submit(&mut self, desc: Descriptor, done: CompletionToken) -> Option<Cookie>;

    /// Start every queued descriptor that is not running yet.
    fn issue_pending(&mut self);

    /// Abort all queued and running transfers and wait until the hardware has
    /// stopped touching their memory. Tokens of aborted transfers are dropped
    /// without completing.
    fn terminate_sync(&mut self);

    /// Suspend the running transfer, keeping its position.
    fn pause(&mut self);

    /// Continue a paused transfer.
    fn resume(&mut self);
}

/// Hands out DMA channels by name.
pub trait ChannelProvider {
    type Channel: DmaChannel;

    /// Request exclusive use of the named channel. Dropping the channel
    /// releases it.
    fn request_channel(&mut self, name: &str) -> Option<Self::Channel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phys_addr_display() {
        assert_eq!(PhysAddr(0x1000).to_string(), "0x00001000");
    }

    #[test]
    fn heap_block_is_zeroed() {
        let mut block = HeapBlock::zeroed(16, PhysAddr(0x2000));
        assert_eq!(block.as_ref().len(), 16);
        assert!(block.as_ref().iter().all(|&b| b == 0));
        block.as_mut()[3] = 7;
        assert_eq!(block.as_ref()[3], 7);
        assert_eq!(block.phys_addr(), PhysAddr(0x2000));
    }
}
