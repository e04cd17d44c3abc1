//! Test doubles for the hardware and host collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::dma::{
    BufferId, ChannelProvider, CoherentMemory, CompletionToken, Cookie, Descriptor, DmaChannel,
    PhysAddr,
};
use crate::stream::PcmHost;

/// Shared record of everything a [`MockChannel`] was asked to do.
#[derive(Default)]
pub struct Ledger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    alloc_budget: Mutex<Option<usize>>,
    reject_prep: AtomicBool,
    reject_submit: AtomicBool,
    submits: Mutex<Vec<Descriptor>>,
    pending: Mutex<VecDeque<CompletionToken>>,
    issued: AtomicUsize,
    terminations: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    released_at_channel_drop: Mutex<Option<usize>>,
}

impl Ledger {
    pub fn new() -> Arc<Self> {
        Arc::new(Ledger::default())
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Allow `n` more allocations, then fail.
    pub fn set_alloc_budget(&self, n: usize) {
        *self.alloc_budget.lock().unwrap() = Some(n);
    }

    pub fn clear_alloc_budget(&self) {
        *self.alloc_budget.lock().unwrap() = None;
    }

    pub fn reject_prep(&self, reject: bool) {
        self.reject_prep.store(reject, Ordering::SeqCst);
    }

    pub fn reject_submit(&self, reject: bool) {
        self.reject_submit.store(reject, Ordering::SeqCst);
    }

    pub fn submits(&self) -> Vec<Descriptor> {
        self.submits.lock().unwrap().clone()
    }

    pub fn pending_ids(&self) -> Vec<BufferId> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(CompletionToken::buffer_id)
            .collect()
    }

    /// Finish the oldest pending transfer. Returns `false` if none is pending.
    pub fn complete_oldest(&self) -> bool {
        let token = self.pending.lock().unwrap().pop_front();
        match token {
            Some(token) => {
                token.complete();
                true
            }
            None => false,
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// How many blocks had been released when the channel went away.
    pub fn released_at_channel_drop(&self) -> Option<usize> {
        *self.released_at_channel_drop.lock().unwrap()
    }
}

/// Heap memory that reports its release to the ledger.
pub struct TrackedBlock {
    data: Vec<u8>,
    phys: PhysAddr,
    ledger: Arc<Ledger>,
}

impl AsRef<[u8]> for TrackedBlock {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl AsMut<[u8]> for TrackedBlock {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl CoherentMemory for TrackedBlock {
    fn phys_addr(&self) -> PhysAddr {
        self.phys
    }
}

impl Drop for TrackedBlock {
    fn drop(&mut self) {
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockChannel {
    ledger: Arc<Ledger>,
    next_cookie: i32,
}

impl MockChannel {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        MockChannel {
            ledger,
            next_cookie: 1,
        }
    }
}

impl DmaChannel for MockChannel {
    type Memory = TrackedBlock;

    fn alloc_coherent(&mut self, len: usize) -> Option<TrackedBlock> {
        if let Some(budget) = self.ledger.alloc_budget.lock().unwrap().as_mut() {
            if *budget == 0 {
                return None;
            }
            *budget -= 1;
        }
        let n = self.ledger.allocated.fetch_add(1, Ordering::SeqCst) as u64;
        Some(TrackedBlock {
            data: std::vec![0u8; len],
            phys: PhysAddr(0x1000_0000 + n * 0x1_0000),
            ledger: self.ledger.clone(),
        })
    }

    fn prep_slave_single(&mut self, phys: PhysAddr, len: usize) -> Option<Descriptor> {
        if self.ledger.reject_prep.load(Ordering::SeqCst) {
            return None;
        }
        Some(Descriptor { phys, len })
    }

    fn submit(&mut self, desc: Descriptor, done: CompletionToken) -> Option<Cookie> {
        if self.ledger.reject_submit.load(Ordering::SeqCst) {
            return None;
        }
        self.ledger.submits.lock().unwrap().push(desc);
        self.ledger.pending.lock().unwrap().push_back(done);
        let cookie = Cookie(self.next_cookie);
        self.next_cookie += 1;
        Some(cookie)
    }

    fn issue_pending(&mut self) {
        self.ledger.issued.fetch_add(1, Ordering::SeqCst);
    }

    fn terminate_sync(&mut self) {
        self.ledger.pending.lock().unwrap().clear();
        self.ledger.terminations.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&mut self) {
        self.ledger.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.ledger.resumes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        *self.ledger.released_at_channel_drop.lock().unwrap() = Some(self.ledger.released());
    }
}

pub struct MockProvider {
    pub ledger: Arc<Ledger>,
    pub available: bool,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider {
            ledger: Ledger::new(),
            available: true,
        }
    }
}

impl ChannelProvider for MockProvider {
    type Channel = MockChannel;

    fn request_channel(&mut self, _name: &str) -> Option<MockChannel> {
        self.available
            .then(|| MockChannel::new(self.ledger.clone()))
    }
}

/// Host that counts period notifications.
#[derive(Clone, Default)]
pub struct CountingHost {
    periods: Arc<AtomicUsize>,
}

impl CountingHost {
    pub fn periods(&self) -> usize {
        self.periods.load(Ordering::SeqCst)
    }
}

impl PcmHost for CountingHost {
    fn period_elapsed(&mut self) {
        self.periods.fetch_add(1, Ordering::SeqCst);
    }
}
