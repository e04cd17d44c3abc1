//! Owner of the DMA channel and of every buffer handed to it.
//!
//! ## Buffer ownership
//!
//! - [`submit`](TransferEngine::submit) takes the buffer by value. If the
//!   channel refuses it the buffer is released on the spot, so a rejected
//!   transfer never leaks.
//! - Accepted buffers wait in the in-flight list until their completion is
//!   [`reap`](TransferEngine::reap)ed.
//! - [`terminate`](TransferEngine::terminate) moves everything in flight to
//!   the abandoned list; those buffers are released by
//!   [`release_abandoned`](TransferEngine::release_abandoned), never by a
//!   completion.
//! - Dropping the engine with transfers in flight terminates the channel
//!   first, so the hardware never reads freed memory.

use alloc::vec::Vec;

use super::{BufferId, CompletionQueue, Cookie, DmaChannel};
use crate::buffer::{BufferState, TransferBuffer};
use crate::constants::MAX_IN_FLIGHT;
use crate::error::{Error, HardwareError, Resource, Result};

/// Run state of the wrapped channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Descriptors are queued but not issued.
    Idle,
    /// Queued descriptors are issued as soon as they are submitted.
    Running,
    /// The running transfer is suspended.
    Paused,
}

/// Counters kept by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub allocated: u64,
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub abandoned: u64,
}

/// Wrapper around one [`DmaChannel`].
///
/// The channel is declared last so it outlives the memory it handed out.
pub struct TransferEngine<C: DmaChannel> {
    state: ChannelState,
    completions: CompletionQueue,
    in_flight: Vec<TransferBuffer<C::Memory>>,
    abandoned: Vec<TransferBuffer<C::Memory>>,
    next_id: u32,
    stats: EngineStats,
    channel: C,
}

impl<C: DmaChannel> TransferEngine<C> {
    pub fn new(channel: C) -> Self {
        TransferEngine {
            state: ChannelState::Idle,
            completions: CompletionQueue::new(MAX_IN_FLIGHT),
            in_flight: Vec::with_capacity(MAX_IN_FLIGHT),
            abandoned: Vec::new(),
            next_id: 0,
            stats: EngineStats::default(),
            channel,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Buffers currently owned by the hardware, oldest first.
    pub fn in_flight(&self) -> &[TransferBuffer<C::Memory>] {
        &self.in_flight
    }

    pub fn abandoned_count(&self) -> usize {
        self.abandoned.len()
    }

    /// Allocate a fresh spare buffer of `len` bytes.
    pub fn alloc_buffer(&mut self, len: usize) -> Result<TransferBuffer<C::Memory>> {
        let memory = self.channel.alloc_coherent(len).ok_or_else(|| {
            log::error!("coherent allocation of {len} bytes failed");
            Error::ResourceExhaustion(Resource::TransferBuffer)
        })?;

        let id = BufferId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.stats.allocated += 1;

        let buffer = TransferBuffer::new(id, memory);
        log::debug!("allocated {:?} at {}", id, buffer.phys_addr());
        Ok(buffer)
    }

    /// Hand the first `len` bytes of `buffer` to the hardware.
    ///
    /// On success the buffer is in flight and the transfer starts now if the
    /// engine is running, or at the next [`start`](Self::start) otherwise.
    pub fn submit(&mut self, mut buffer: TransferBuffer<C::Memory>, len: usize) -> Result<Cookie> {
        let phys = buffer.phys_addr();

        if self.in_flight.len() >= MAX_IN_FLIGHT {
            self.stats.rejected += 1;
            log::error!("{} transfers in flight, dropping {:?}", self.in_flight.len(), buffer.id());
            return Err(Error::ResourceExhaustion(Resource::TransferSlots));
        }

        let desc = match len {
            0 => None,
            len if len > buffer.capacity() => None,
            len => self.channel.prep_slave_single(phys, len),
        };
        let Some(desc) = desc else {
            self.stats.rejected += 1;
            log::error!("descriptor for {len} bytes at {phys} rejected");
            return Err(HardwareError::Descriptor { phys, len }.into());
        };

        let token = self.completions.token(buffer.id());
        let Some(cookie) = self.channel.submit(desc, token) else {
            self.stats.rejected += 1;
            log::error!("submission of {:?} failed", buffer.id());
            return Err(HardwareError::Submission.into());
        };

        buffer.set_state(BufferState::Submitted);
        log::debug!("submitted {:?}, {len} bytes at {phys}, cookie {}", buffer.id(), cookie.0);
        self.in_flight.push(buffer);
        self.stats.submitted += 1;

        if self.state == ChannelState::Running {
            self.channel.issue_pending();
        }
        Ok(cookie)
    }

    /// Start issuing transfers, including those queued while idle.
    pub fn start(&mut self) {
        self.state = ChannelState::Running;
        self.channel.issue_pending();
    }

    /// Release every buffer whose completion has arrived.
    ///
    /// Returns the number of buffers released.
    pub fn reap(&mut self) -> usize {
        let mut released = 0;
        while let Some(id) = self.completions.pop() {
            match self.in_flight.iter().position(|b| b.id() == id) {
                Some(index) => {
                    let mut buffer = self.in_flight.remove(index);
                    buffer.set_state(BufferState::Completed);
                    self.stats.completed += 1;
                    released += 1;
                }
                None => log::warn!("completion for unknown {id:?}"),
            }
        }
        released
    }

    /// Abort all transfers and wait for the hardware to let go of them.
    pub fn terminate(&mut self) {
        self.reap();
        self.channel.terminate_sync();

        if !self.in_flight.is_empty() {
            log::debug!("abandoning {} in-flight transfers", self.in_flight.len());
        }
        self.stats.abandoned += self.in_flight.len() as u64;
        self.abandoned.append(&mut self.in_flight);

        // Completions that raced the abort refer to abandoned buffers.
        while let Some(id) = self.completions.pop() {
            log::warn!("discarding completion of terminated {id:?}");
        }
        self.state = ChannelState::Idle;
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != ChannelState::Running {
            return Err(HardwareError::NotRunning.into());
        }
        self.channel.pause();
        self.state = ChannelState::Paused;
        Ok(())
    }

    /// Continue the paused transfer and issue whatever was queued meanwhile.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != ChannelState::Paused {
            return Err(HardwareError::NotPaused.into());
        }
        self.channel.resume();
        self.state = ChannelState::Running;
        self.channel.issue_pending();
        Ok(())
    }

    /// Release buffers left behind by [`terminate`](Self::terminate).
    pub fn release_abandoned(&mut self) -> usize {
        let count = self.abandoned.len();
        self.abandoned.clear();
        count
    }

    /// Terminate if anything is in flight, then release every buffer the
    /// engine still owns.
    pub fn release_all(&mut self) -> usize {
        if !self.in_flight.is_empty() {
            self.terminate();
        }
        self.release_abandoned()
    }
}

impl<C: DmaChannel> Drop for TransferEngine<C> {
    fn drop(&mut self) {
        if !self.in_flight.is_empty() {
            self.channel.terminate_sync();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Ledger, MockChannel};

    fn engine() -> (TransferEngine<MockChannel>, std::sync::Arc<Ledger>) {
        let ledger = Ledger::new();
        (TransferEngine::new(MockChannel::new(ledger.clone())), ledger)
    }

    #[test]
    fn alloc_assigns_unique_ids() {
        let (mut engine, ledger) = engine();
        let a = engine.alloc_buffer(64).unwrap();
        let b = engine.alloc_buffer(64).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(ledger.allocated(), 2);
        assert_eq!(engine.stats().allocated, 2);
    }

    #[test]
    fn alloc_failure_is_exhaustion() {
        let (mut engine, ledger) = engine();
        ledger.set_alloc_budget(0);
        assert_eq!(
            engine.alloc_buffer(64).unwrap_err(),
            Error::ResourceExhaustion(Resource::TransferBuffer)
        );
    }

    #[test]
    fn submit_queues_until_started() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(64).unwrap();
        let id = buffer.id();

        engine.submit(buffer, 64).unwrap();
        assert_eq!(engine.in_flight().len(), 1);
        assert_eq!(engine.in_flight()[0].state(), BufferState::Submitted);
        assert_eq!(ledger.submits().len(), 1);
        assert_eq!(ledger.issued(), 0);

        engine.start();
        assert_eq!(ledger.issued(), 1);
        assert_eq!(ledger.pending_ids(), std::vec![id]);
    }

    #[test]
    fn submit_while_running_issues_immediately() {
        let (mut engine, ledger) = engine();
        engine.start();
        let buffer = engine.alloc_buffer(64).unwrap();
        engine.submit(buffer, 32).unwrap();
        assert_eq!(ledger.issued(), 2);
        assert_eq!(ledger.submits()[0].len, 32);
    }

    #[test]
    fn completion_releases_buffer() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(64).unwrap();
        engine.submit(buffer, 64).unwrap();

        assert_eq!(engine.reap(), 0);
        assert!(ledger.complete_oldest());
        assert_eq!(ledger.released(), 0, "release happens in the producer context");

        assert_eq!(engine.reap(), 1);
        assert!(engine.in_flight().is_empty());
        assert_eq!(ledger.released(), 1);
        assert_eq!(engine.stats().completed, 1);
    }

    #[test]
    fn rejected_descriptor_releases_buffer() {
        let (mut engine, ledger) = engine();
        ledger.reject_prep(true);
        let buffer = engine.alloc_buffer(64).unwrap();
        let phys = buffer.phys_addr();

        assert_eq!(
            engine.submit(buffer, 64).unwrap_err(),
            Error::Hardware(HardwareError::Descriptor { phys, len: 64 })
        );
        assert!(engine.in_flight().is_empty());
        assert_eq!(ledger.released(), 1);
        assert_eq!(engine.stats().rejected, 1);
    }

    #[test]
    fn bad_length_never_reaches_channel() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(64).unwrap();
        assert!(matches!(
            engine.submit(buffer, 65),
            Err(Error::Hardware(HardwareError::Descriptor { len: 65, .. }))
        ));
        let buffer = engine.alloc_buffer(64).unwrap();
        assert!(engine.submit(buffer, 0).is_err());
        assert!(ledger.submits().is_empty());
        assert_eq!(ledger.released(), 2);
    }

    #[test]
    fn rejected_submission_releases_buffer() {
        let (mut engine, ledger) = engine();
        ledger.reject_submit(true);
        let buffer = engine.alloc_buffer(64).unwrap();
        assert_eq!(
            engine.submit(buffer, 64).unwrap_err(),
            Error::Hardware(HardwareError::Submission)
        );
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn in_flight_is_bounded() {
        let (mut engine, ledger) = engine();
        for _ in 0..MAX_IN_FLIGHT {
            let buffer = engine.alloc_buffer(16).unwrap();
            engine.submit(buffer, 16).unwrap();
        }
        let buffer = engine.alloc_buffer(16).unwrap();
        assert_eq!(
            engine.submit(buffer, 16).unwrap_err(),
            Error::ResourceExhaustion(Resource::TransferSlots)
        );
        assert_eq!(ledger.released(), 1);

        ledger.complete_oldest();
        engine.reap();
        let buffer = engine.alloc_buffer(16).unwrap();
        assert!(engine.submit(buffer, 16).is_ok());
    }

    #[test]
    fn terminate_abandons_in_flight() {
        let (mut engine, ledger) = engine();
        engine.start();
        for _ in 0..2 {
            let buffer = engine.alloc_buffer(16).unwrap();
            engine.submit(buffer, 16).unwrap();
        }

        engine.terminate();
        assert_eq!(engine.state(), ChannelState::Idle);
        assert_eq!(ledger.terminations(), 1);
        assert!(engine.in_flight().is_empty());
        assert_eq!(engine.abandoned_count(), 2);
        assert_eq!(ledger.released(), 0);

        assert_eq!(engine.release_abandoned(), 2);
        assert_eq!(ledger.released(), 2);
        assert_eq!(engine.release_abandoned(), 0);
    }

    #[test]
    fn terminate_reaps_finished_transfers_first() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(16).unwrap();
        engine.submit(buffer, 16).unwrap();
        ledger.complete_oldest();

        engine.terminate();
        assert_eq!(engine.abandoned_count(), 0);
        assert_eq!(engine.stats().completed, 1);
    }

    #[test]
    fn pause_requires_running() {
        let (mut engine, ledger) = engine();
        assert_eq!(engine.pause(), Err(HardwareError::NotRunning.into()));
        assert_eq!(engine.resume(), Err(HardwareError::NotPaused.into()));

        engine.start();
        engine.pause().unwrap();
        assert_eq!(engine.state(), ChannelState::Paused);
        assert_eq!(engine.pause(), Err(HardwareError::NotRunning.into()));

        engine.resume().unwrap();
        assert_eq!(engine.state(), ChannelState::Running);
        assert_eq!(ledger.pauses(), 1);
        assert_eq!(ledger.resumes(), 1);
    }

    #[test]
    fn resume_issues_transfers_queued_while_paused() {
        let (mut engine, ledger) = engine();
        engine.start();
        engine.pause().unwrap();

        let buffer = engine.alloc_buffer(64).unwrap();
        engine.submit(buffer, 64).unwrap();
        assert_eq!(ledger.issued(), 1, "paused engine only queues");

        engine.resume().unwrap();
        assert_eq!(ledger.issued(), 2);
        assert_eq!(ledger.pending_ids().len(), 1);
    }

    #[test]
    fn release_all_terminates_first() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(16).unwrap();
        engine.submit(buffer, 16).unwrap();

        assert_eq!(engine.release_all(), 1);
        assert_eq!(ledger.terminations(), 1);
        assert_eq!(ledger.released(), 1);
    }

    #[test]
    fn drop_with_transfers_in_flight_terminates() {
        let (mut engine, ledger) = engine();
        let buffer = engine.alloc_buffer(16).unwrap();
        engine.submit(buffer, 16).unwrap();

        drop(engine);
        assert_eq!(ledger.terminations(), 1);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.released_at_channel_drop(), Some(1), "memory goes before the channel");
    }
}
