//! # dma-pcm
//!
//! A `no_std` + `alloc` playback core that moves interleaved PCM frames from
//! a host audio subsystem's ring buffer to a memory-to-device DMA engine,
//! double-buffered through two 64 KiB coherent transfer buffers.
//!
//! The host (an OS audio framework, a simulator) and the DMA engine are
//! collaborators behind traits; this crate owns the state machine, the
//! buffer lifecycle and the sample packing in between.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Params | [`hardware`] | Capability table and geometry negotiation |
//! | Codec | [`encode`] | Packed S24 stereo frames to 64-bit DMA words |
//! | Hardware | [`dma`] | `DmaChannel` trait, completion tokens, transfer engine |
//! | Memory | [`buffer`] | Transfer buffers and the active/spare pool |
//! | Data path | [`ring`] | Hardware pointer over the host ring, period accounting |
//! | Control | [`stream`] | Lifecycle state machine, `StreamController` |
//!
//! ## Quick start
//!
//! ```ignore
//! use dma_pcm::{Command, HwParams, RingSnapshot, StreamController};
//!
//! let mut stream = StreamController::new(provider, || host.period_elapsed());
//! stream.open()?;
//! let geometry = stream.configure(&HwParams::native(65536, 8192))?;
//! stream.prepare()?;
//! stream.trigger(Command::Start)?;
//!
//! // Whenever the application has written more frames:
//! stream.on_data_available(&RingSnapshot { area: &ring, appl_ptr })?;
//! let hw_ptr = stream.current_hardware_position();
//!
//! stream.close();
//! ```
//!
//! ## Audio parameters
//!
//! - **Format:** S24_LE packed, stereo ([`constants::FRAME_BYTES`] bytes per frame)
//! - **Sample rate:** 48 kHz ([`constants::SAMPLE_RATE`])
//! - **DMA word:** `left << 40 | right << 8`, little-endian ([`encode`])
//! - **Transfer buffer:** 64 KiB ([`constants::AUDIO_BUFFER_SIZE`])

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod buffer;
pub mod constants;
pub mod dma;
pub mod encode;
pub mod error;
pub mod hardware;
pub mod ring;
pub mod stream;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorKind, Result};
pub use hardware::{Geometry, HwParams, PcmHardware, SampleFormat};
pub use ring::RingSnapshot;
pub use stream::{Command, PcmHost, StreamConfig, StreamController, StreamState, StreamStats};
