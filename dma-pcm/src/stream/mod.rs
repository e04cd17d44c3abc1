//! Stream lifecycle and the contract with the host audio subsystem.
//!
//! ## State machine
//!
//! | From | Operation | To |
//! |------|-----------|----|
//! | Closed | open | Open |
//! | Open, Configured | configure | Configured |
//! | Configured, Prepared, Stopped | prepare | Prepared |
//! | Configured, Prepared, Stopped | hw_free | Open |
//! | Prepared | start | Running |
//! | Running, Paused | stop | Prepared |
//! | Running | pause | Paused |
//! | Paused | resume | Running |
//! | Prepared, Running, Paused | data-path exhaustion | Stopped |
//! | any | close | Closed |

pub mod controller;


pub use controller::StreamController;

use crate::buffer::PoolStats;
use crate::constants::DEFAULT_CHANNEL_NAME;
use crate::dma::EngineStats;
use crate::hardware::PcmHardware;

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Closed,
    Open,
    Configured,
    Prepared,
    Running,
    Paused,
    /// Halted after running out of transfer buffers; `prepare` recovers.
    Stopped,
}

impl StreamState {
    /// Whether the data path may run in this state.
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            StreamState::Prepared | StreamState::Running | StreamState::Paused
        )
    }
}

/// Trigger commands sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Operations checked against the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Configure,
    Prepare,
    HwFree,
    Trigger(Command),
    DataAvailable,
}

/// Host audio subsystem callbacks.
pub trait PcmHost {
    /// At least one period of the ring buffer has been consumed.
    fn period_elapsed(&mut self);
}

impl<F: FnMut()> PcmHost for F {
    fn period_elapsed(&mut self) {
        self()
    }
}

/// Static configuration of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub hardware: PcmHardware,
    /// DMA channel requested at open.
    pub channel_name: &'static str,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            hardware: PcmHardware::DEFAULT,
            channel_name: DEFAULT_CHANNEL_NAME,
        }
    }
}

/// Snapshot of the stream counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub engine: EngineStats,
    pub pool: PoolStats,
    pub periods_elapsed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_states() {
        assert!(StreamState::Prepared.is_streaming());
        assert!(StreamState::Running.is_streaming());
        assert!(StreamState::Paused.is_streaming());
        assert!(!StreamState::Stopped.is_streaming());
        assert!(!StreamState::Configured.is_streaming());
        assert!(!StreamState::Closed.is_streaming());
    }

    #[test]
    fn closures_are_hosts() {
        let mut count = 0;
        let mut host = || count += 1;
        host.period_elapsed();
        host.period_elapsed();
        assert_eq!(count, 2);
    }

    #[test]
    fn default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.channel_name, "dma0chan0");
        assert_eq!(config.hardware, PcmHardware::DEFAULT);
    }
}
