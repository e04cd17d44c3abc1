/// Size of one transfer buffer in bytes (64 KiB).
pub const AUDIO_BUFFER_SIZE: usize = 64 * 1024;

/// Number of interleaved channels (stereo).
pub const CHANNELS: u32 = 2;

/// Bytes per sample in the host ring buffer (packed 24-bit).
pub const SAMPLE_BYTES: usize = 3;

/// Bytes per frame in the host ring buffer: 2 channels × 3 bytes.
pub const FRAME_BYTES: usize = SAMPLE_BYTES * CHANNELS as usize;

/// Bytes per frame once encoded into the hardware word layout.
pub const WORD_BYTES: usize = 8;

/// The one sample rate the hardware is clocked for.
pub const SAMPLE_RATE: u32 = 48_000;

/// Maximum number of buffers owned by the transfer engine at once.
pub const MAX_IN_FLIGHT: usize = 8;

/// DMA channel requested when a stream is opened.
pub const DEFAULT_CHANNEL_NAME: &str = "dma0chan0";
