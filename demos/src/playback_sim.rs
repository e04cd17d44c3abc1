//! Playback simulation: a 440 Hz tone through the full stream lifecycle.
//!
//! ```text
//!   tone generator ──► host ring (S24 stereo) ──► StreamController
//!                                                    │ 64 KiB transfers
//!                                                 SimChannel worker thread
//!                                                    │ completion tokens
//!                                                 reaped on the next tick
//! ```
//!
//! The simulated channel "plays" each transfer by waiting as long as the
//! frames it carries would take at 48 kHz, divided by a speed-up factor.
//!
//! Usage: `playback_sim [seconds] [speedup]` (defaults: 3 seconds, 8x).
//! Set `RUST_LOG=debug` to watch buffers change hands.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use dma_pcm::constants::{FRAME_BYTES, SAMPLE_RATE, WORD_BYTES};
use dma_pcm::dma::{
    ChannelProvider, CompletionToken, Cookie, Descriptor, DmaChannel, HeapBlock, PhysAddr,
};
use dma_pcm::{Command, HwParams, RingSnapshot, StreamController, StreamState};

const TICK: Duration = Duration::from_millis(1);
const TONE_HZ: f32 = 440.0;
const AMPLITUDE: f32 = 0.5 * 8_388_607.0;

struct Transfer {
    frames_left: u64,
    token: CompletionToken,
}

#[derive(Default)]
struct Hardware {
    queue: VecDeque<Transfer>,
    current: Option<Transfer>,
    running: bool,
    paused: bool,
    shutdown: bool,
    frames_played: u64,
}

/// A DMA channel backed by a thread that consumes transfers in real time.
struct SimChannel {
    hw: Arc<Mutex<Hardware>>,
    worker: Option<JoinHandle<()>>,
    next_phys: u64,
    next_cookie: i32,
}

impl SimChannel {
    fn spawn(speedup: u64) -> Self {
        let hw = Arc::new(Mutex::new(Hardware::default()));
        let frames_per_sec = f64::from(SAMPLE_RATE) * speedup as f64;
        let worker = {
            let hw = hw.clone();
            thread::spawn(move || run_hardware(&hw, frames_per_sec))
        };
        SimChannel {
            hw,
            worker: Some(worker),
            next_phys: 0x8000_0000,
            next_cookie: 1,
        }
    }

    fn hw(&self) -> MutexGuard<'_, Hardware> {
        self.hw.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn run_hardware(hw: &Mutex<Hardware>, frames_per_sec: f64) {
    let mut last = Instant::now();
    let mut credit = 0.0;
    loop {
        thread::sleep(TICK);
        let now = Instant::now();
        credit += now.duration_since(last).as_secs_f64() * frames_per_sec;
        last = now;

        let mut hw = hw.lock().unwrap_or_else(|e| e.into_inner());
        if hw.shutdown {
            break;
        }
        if !hw.running || hw.paused {
            credit = 0.0;
            continue;
        }
        if hw.current.is_none() {
            hw.current = hw.queue.pop_front();
        }
        let Some(transfer) = hw.current.as_mut() else {
            credit = 0.0;
            continue;
        };

        let step = transfer.frames_left.min(credit as u64);
        transfer.frames_left -= step;
        credit -= step as f64;
        hw.frames_played += step;

        if hw.current.as_ref().is_some_and(|t| t.frames_left == 0) {
            if let Some(done) = hw.current.take() {
                done.token.complete();
            }
        }
    }
}

impl DmaChannel for SimChannel {
    type Memory = HeapBlock;

    fn alloc_coherent(&mut self, len: usize) -> Option<HeapBlock> {
        let phys = PhysAddr(self.next_phys);
        self.next_phys += len as u64;
        Some(HeapBlock::zeroed(len, phys))
    }

    fn prep_slave_single(&mut self, phys: PhysAddr, len: usize) -> Option<Descriptor> {
        (len % WORD_BYTES == 0).then_some(Descriptor { phys, len })
    }

    fn submit(&mut self, desc: Descriptor, done: CompletionToken) -> Option<Cookie> {
        self.hw().queue.push_back(Transfer {
            frames_left: (desc.len / WORD_BYTES) as u64,
            token: done,
        });
        let cookie = Cookie(self.next_cookie);
        self.next_cookie += 1;
        Some(cookie)
    }

    fn issue_pending(&mut self) {
        self.hw().running = true;
    }

    fn terminate_sync(&mut self) {
        let mut hw = self.hw();
        hw.queue.clear();
        hw.current = None;
        hw.running = false;
        hw.paused = false;
    }

    fn pause(&mut self) {
        self.hw().paused = true;
    }

    fn resume(&mut self) {
        self.hw().paused = false;
    }
}

impl Drop for SimChannel {
    fn drop(&mut self) {
        self.hw().shutdown = true;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        log::info!("channel released, {} frames played", self.hw().frames_played);
    }
}

struct SimProvider {
    speedup: u64,
}

impl ChannelProvider for SimProvider {
    type Channel = SimChannel;

    fn request_channel(&mut self, name: &str) -> Option<SimChannel> {
        log::info!("granting {name} ({}x real time)", self.speedup);
        Some(SimChannel::spawn(self.speedup))
    }
}

/// Writes a stereo sine into the host ring, one frame at a time.
struct ToneWriter {
    phase: f32,
    step: f32,
}

impl ToneWriter {
    fn new() -> Self {
        ToneWriter {
            phase: 0.0,
            step: TAU * TONE_HZ / SAMPLE_RATE as f32,
        }
    }

    fn fill(&mut self, ring: &mut [u8], start: usize, frames: usize) {
        let capacity = ring.len() / FRAME_BYTES;
        for i in 0..frames {
            let sample = (self.phase.sin() * AMPLITUDE) as i32;
            self.phase = (self.phase + self.step) % TAU;

            let bytes = sample.to_le_bytes();
            let at = (start + i) % capacity * FRAME_BYTES;
            ring[at..at + 3].copy_from_slice(&bytes[..3]);
            ring[at + 3..at + 6].copy_from_slice(&bytes[..3]);
        }
    }
}

fn arg(index: usize, default: u64) -> anyhow::Result<u64> {
    match std::env::args().nth(index) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("argument {index} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let seconds = arg(1, 3)?;
    let speedup = arg(2, 8)?.max(1);

    let periods = Arc::new(AtomicU64::new(0));
    let host = {
        let periods = periods.clone();
        move || {
            periods.fetch_add(1, Ordering::Relaxed);
        }
    };

    let mut stream = StreamController::new(SimProvider { speedup }, host);
    stream.open()?;
    let geometry = stream.configure(&HwParams::native(65536, 8192))?;
    stream.prepare()?;

    let mut ring = vec![0u8; geometry.buffer_bytes()];
    let mut tone = ToneWriter::new();
    let mut appl_ptr = 0;

    // Prefill one period before start, the way a host primes the ring.
    tone.fill(&mut ring, appl_ptr, geometry.period_frames);
    appl_ptr = (appl_ptr + geometry.period_frames) % geometry.buffer_frames;
    stream.on_data_available(&RingSnapshot { area: &ring, appl_ptr })?;
    stream.trigger(Command::Start)?;

    let period_time = Duration::from_secs_f64(
        geometry.period_frames as f64 / f64::from(SAMPLE_RATE) / speedup as f64,
    );
    let total_periods = seconds * u64::from(SAMPLE_RATE) / geometry.period_frames as u64;

    for n in 1..total_periods {
        tone.fill(&mut ring, appl_ptr, geometry.period_frames);
        appl_ptr = (appl_ptr + geometry.period_frames) % geometry.buffer_frames;
        stream.on_data_available(&RingSnapshot { area: &ring, appl_ptr })?;

        if n == total_periods / 2 {
            stream.trigger(Command::Pause)?;
            thread::sleep(period_time * 4);
            stream.trigger(Command::Resume)?;
        }
        thread::sleep(period_time);
    }

    if stream.state() != StreamState::Running {
        bail!("stream left running state: {:?}", stream.state());
    }
    stream.trigger(Command::Stop)?;

    let stats = stream.stats();
    log::info!(
        "{} periods elapsed, {} transfers submitted, {} completed, {} abandoned at stop",
        periods.load(Ordering::Relaxed),
        stats.engine.submitted,
        stats.engine.completed,
        stats.engine.abandoned
    );
    log::info!(
        "hardware position {} of {} frames",
        stream.current_hardware_position(),
        geometry.buffer_frames
    );

    stream.close();
    Ok(())
}
