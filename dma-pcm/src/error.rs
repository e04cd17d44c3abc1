//! Error types shared by every stage of the playback pipeline.
//!
//! Every variant belongs to exactly one [`ErrorKind`]:
//!
//! | Kind | Variants | Recoverable |
//! |------|----------|-------------|
//! | Configuration | [`UnsupportedParameter`](Error::UnsupportedParameter), [`InvalidGeometry`](Error::InvalidGeometry), [`PartialFrame`](Error::PartialFrame), [`RingTooSmall`](Error::RingTooSmall), [`InvalidAdvance`](Error::InvalidAdvance) | yes |
//! | ResourceExhaustion | [`ResourceExhaustion`](Error::ResourceExhaustion) | no |
//! | Hardware | [`Hardware`](Error::Hardware) | no |
//! | InvalidState | [`InvalidStateTransition`](Error::InvalidStateTransition) | yes |

use thiserror::Error;

use crate::dma::PhysAddr;
use crate::hardware::SampleFormat;
use crate::stream::{Operation, StreamState};

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ResourceExhaustion,
    Hardware,
    InvalidState,
}

/// A negotiated parameter the hardware cannot honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Parameter {
    #[error("sample format {0:?}")]
    Format(SampleFormat),
    #[error("sample rate {0} Hz")]
    Rate(u32),
    #[error("{0} channels")]
    Channels(u32),
}

/// A resource that could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Resource {
    #[error("DMA channel")]
    DmaChannel,
    #[error("coherent transfer buffer")]
    TransferBuffer,
    #[error("spare transfer buffer")]
    SpareBuffer,
    #[error("in-flight transfer slot")]
    TransferSlots,
}

/// Faults reported by the DMA channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("descriptor rejected for {len} bytes at {phys}")]
    Descriptor { phys: PhysAddr, len: usize },
    #[error("descriptor submission failed")]
    Submission,
    #[error("channel is not running")]
    NotRunning,
    #[error("channel is not paused")]
    NotPaused,
}

/// The crate-wide error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported parameter: {0}")]
    UnsupportedParameter(Parameter),

    #[error("invalid geometry: {buffer_bytes} byte buffer cannot hold {min_periods} periods of {period_bytes} bytes")]
    InvalidGeometry {
        buffer_bytes: usize,
        period_bytes: usize,
        min_periods: u32,
    },

    #[error("{len} bytes is not a whole number of frames")]
    PartialFrame { len: usize },

    #[error("ring area of {len} bytes is smaller than {required} bytes")]
    RingTooSmall { len: usize, required: usize },

    #[error("cannot advance {requested} frames, only {available} available")]
    InvalidAdvance { requested: usize, available: usize },

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(Resource),

    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("cannot {op:?} while {from:?}")]
    InvalidStateTransition { from: StreamState, op: Operation },
}

impl Error {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedParameter(_)
            | Error::InvalidGeometry { .. }
            | Error::PartialFrame { .. }
            | Error::RingTooSmall { .. }
            | Error::InvalidAdvance { .. } => ErrorKind::Configuration,
            Error::ResourceExhaustion(_) => ErrorKind::ResourceExhaustion,
            Error::Hardware(_) => ErrorKind::Hardware,
            Error::InvalidStateTransition { .. } => ErrorKind::InvalidState,
        }
    }

    /// Whether the caller may fix its input and retry the same call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::InvalidState
        )
    }
}
