//! Bridge from the host's circular frame buffer to the transfer buffers.
//!
//! The host owns the ring area and the application pointer; the bridge owns
//! the hardware pointer. Both are frame indices modulo the ring capacity:
//!
//! ```text
//!            hw_ptr              appl_ptr
//!              │  available frames  │
//! ┌────────────▼────────────────────▼─────────────┐
//! │ consumed   │ ███████████████████│  free        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! When `appl_ptr < hw_ptr` the available region wraps past the end of the
//! ring and is read in two contiguous pieces.

use crate::constants::{FRAME_BYTES, WORD_BYTES};
use crate::encode;
use crate::error::{Error, Result};
use crate::hardware::Geometry;
use crate::stream::PcmHost;

/// Frames encoded per scratch round. Keeps the encode buffer on the stack.
const CHUNK_FRAMES: usize = 256;

/// What the host exposes on each tick: its ring area and write position.
#[derive(Debug, Clone, Copy)]
pub struct RingSnapshot<'a> {
    /// Interleaved packed frames, at least `capacity × 6` bytes.
    pub area: &'a [u8],
    /// Next frame the application will write, modulo the ring capacity.
    pub appl_ptr: usize,
}

/// Hardware-side cursor over the host ring buffer.
#[derive(Debug, Clone)]
pub struct RingBridge {
    capacity: usize,
    period_frames: usize,
    hw_ptr: usize,
    since_period: usize,
    periods_elapsed: u64,
}

impl RingBridge {
    pub fn new(geometry: &Geometry) -> Self {
        Self::with_capacity(geometry.buffer_frames, geometry.period_frames)
    }

    pub fn with_capacity(capacity: usize, period_frames: usize) -> Self {
        RingBridge {
            capacity,
            period_frames: period_frames.max(1),
            hw_ptr: 0,
            since_period: 0,
            periods_elapsed: 0,
        }
    }

    /// Ring capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next frame the hardware side will read.
    pub fn hw_ptr(&self) -> usize {
        self.hw_ptr
    }

    pub fn periods_elapsed(&self) -> u64 {
        self.periods_elapsed
    }

    /// Rewind to the start of the ring.
    pub fn reset(&mut self) {
        self.hw_ptr = 0;
        self.since_period = 0;
    }

    /// Frames written by the application and not yet consumed.
    pub fn pull_available(&self, ring: &RingSnapshot<'_>) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        (ring.appl_ptr % self.capacity + self.capacity - self.hw_ptr) % self.capacity
    }

    /// Consume `frames` frames starting at the hardware pointer.
    ///
    /// The frames are encoded and handed to `write` in ring order. The
    /// hardware pointer moves past them even if `write` fails, so a rejected
    /// transfer costs audio but never desynchronises the position.
    ///
    /// Returns `true` if a period-elapsed notification was raised.
    pub fn advance<W, H>(
        &mut self,
        ring: &RingSnapshot<'_>,
        frames: usize,
        mut write: W,
        host: &mut H,
        running: bool,
    ) -> Result<bool>
    where
        W: FnMut(&[u8]) -> Result<usize>,
        H: PcmHost + ?Sized,
    {
        let required = self.capacity * FRAME_BYTES;
        if ring.area.len() < required {
            return Err(Error::RingTooSmall {
                len: ring.area.len(),
                required,
            });
        }
        let available = self.pull_available(ring);
        if frames > available {
            return Err(Error::InvalidAdvance {
                requested: frames,
                available,
            });
        }
        if frames == 0 {
            return Ok(false);
        }

        let head = frames.min(self.capacity - self.hw_ptr);
        let start = self.hw_ptr * FRAME_BYTES;
        let result = feed(&ring.area[start..start + head * FRAME_BYTES], &mut write)
            .and_then(|()| feed(&ring.area[..(frames - head) * FRAME_BYTES], &mut write));

        self.hw_ptr = (self.hw_ptr + frames) % self.capacity;
        self.since_period += frames;

        // One notification per tick, however many periods it covered.
        let elapsed = running && self.since_period >= self.period_frames;
        if elapsed {
            self.periods_elapsed += (self.since_period / self.period_frames) as u64;
            self.since_period %= self.period_frames;
            host.period_elapsed();
        }

        result.map(|()| elapsed)
    }
}

fn feed<W>(src: &[u8], write: &mut W) -> Result<()>
where
    W: FnMut(&[u8]) -> Result<usize>,
{
    let mut scratch = [0u8; CHUNK_FRAMES * WORD_BYTES];
    for chunk in src.chunks(CHUNK_FRAMES * FRAME_BYTES) {
        let frames = encode::encode(chunk, &mut scratch)?;
        write(&scratch[..frames * WORD_BYTES])?;
    }
    Ok(())
}
