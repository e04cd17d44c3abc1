//! Static hardware capabilities and parameter negotiation.
//!
//! [`PcmHardware`] describes what the playback path can do. [`PcmHardware::constrain`]
//! turns the parameters requested by the host ([`HwParams`]) into the
//! [`Geometry`] the rest of the pipeline runs with.

use crate::constants::{AUDIO_BUFFER_SIZE, CHANNELS, FRAME_BYTES, SAMPLE_RATE};
use crate::error::{Error, Parameter, Result};

/// Interleaved sample encodings a host may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    S16Le,
    /// Signed 24-bit little-endian, packed in 3 bytes.
    S24Le,
    /// Signed 32-bit little-endian.
    S32Le,
}

impl SampleFormat {
    /// Bytes occupied by one sample of one channel.
    pub const fn sample_bytes(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S32Le => 4,
        }
    }
}

/// Capability table of the playback hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmHardware {
    pub format: SampleFormat,
    pub rate_min: u32,
    pub rate_max: u32,
    pub channels_min: u32,
    pub channels_max: u32,
    pub buffer_bytes_max: usize,
    pub period_bytes_min: usize,
    pub period_bytes_max: usize,
    pub periods_min: u32,
    pub periods_max: u32,
}

impl PcmHardware {
    /// S24 packed stereo at 48 kHz with up to 64 KiB of ring buffer.
    ///
    /// A period is 4–16 KiB (682–2730 frames).
    pub const DEFAULT: PcmHardware = PcmHardware {
        format: SampleFormat::S24Le,
        rate_min: SAMPLE_RATE,
        rate_max: SAMPLE_RATE,
        channels_min: CHANNELS,
        channels_max: CHANNELS,
        buffer_bytes_max: AUDIO_BUFFER_SIZE,
        period_bytes_min: 4096,
        period_bytes_max: 16384,
        periods_min: 2,
        periods_max: 16,
    };

    /// Validate `params` and derive the stream geometry.
    ///
    /// Format, rate and channel count must match exactly. Period and buffer
    /// sizes are clamped to the declared ranges, aligned down to whole frames
    /// and the period count is capped at `periods_max`.
    pub fn constrain(&self, params: &HwParams) -> Result<Geometry> {
        if params.format != self.format {
            return Err(Error::UnsupportedParameter(Parameter::Format(params.format)));
        }
        if !(self.rate_min..=self.rate_max).contains(&params.rate) {
            return Err(Error::UnsupportedParameter(Parameter::Rate(params.rate)));
        }
        if !(self.channels_min..=self.channels_max).contains(&params.channels) {
            return Err(Error::UnsupportedParameter(Parameter::Channels(
                params.channels,
            )));
        }

        let period_bytes = params
            .period_bytes
            .clamp(self.period_bytes_min, self.period_bytes_max);
        let buffer_bytes = params.buffer_bytes.min(self.buffer_bytes_max);

        if buffer_bytes < period_bytes * self.periods_min as usize {
            return Err(Error::InvalidGeometry {
                buffer_bytes,
                period_bytes,
                min_periods: self.periods_min,
            });
        }

        let periods = ((buffer_bytes / period_bytes) as u32).min(self.periods_max);
        let frame_bytes = self.format.sample_bytes() * params.channels as usize;
        let period_frames = period_bytes / frame_bytes;

        Ok(Geometry {
            period_frames,
            periods,
            buffer_frames: period_frames * periods as usize,
        })
    }
}

impl Default for PcmHardware {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Parameters requested by the host when configuring a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwParams {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u32,
    pub buffer_bytes: usize,
    pub period_bytes: usize,
}

impl HwParams {
    /// Native parameters: S24 packed stereo at 48 kHz.
    pub const fn native(buffer_bytes: usize, period_bytes: usize) -> Self {
        HwParams {
            format: SampleFormat::S24Le,
            rate: SAMPLE_RATE,
            channels: CHANNELS,
            buffer_bytes,
            period_bytes,
        }
    }
}

/// Negotiated ring buffer layout, in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub period_frames: usize,
    pub periods: u32,
    pub buffer_frames: usize,
}

impl Geometry {
    pub const fn period_bytes(&self) -> usize {
        self.period_frames * FRAME_BYTES
    }

    pub const fn buffer_bytes(&self) -> usize {
        self.buffer_frames * FRAME_BYTES
    }
}
