use super::{Command, Operation, PcmHost, StreamConfig, StreamState, StreamStats};
use crate::buffer::BufferPool;
use crate::constants::AUDIO_BUFFER_SIZE;
use crate::dma::{ChannelProvider, DmaChannel, TransferEngine};
use crate::error::{Error, ErrorKind, Resource, Result};
use crate::hardware::{Geometry, HwParams};
use crate::ring::{RingBridge, RingSnapshot};

/// Everything that exists between `open` and `close`.
///
/// The pool is declared first so its buffers go before the channel.
struct Session<C: DmaChannel> {
    pool: BufferPool<C::Memory>,
    engine: TransferEngine<C>,
    geometry: Option<Geometry>,
    bridge: Option<RingBridge>,
}

/// One playback stream: lifecycle, data path and position reporting.
///
/// Lifecycle calls and [`on_data_available`](Self::on_data_available) come
/// from the producer context. Transfer completions arrive through the
/// channel's [`CompletionToken`](crate::dma::CompletionToken)s and are
/// reaped here, so no buffer is ever released from the completion context.
pub struct StreamController<P: ChannelProvider, H: PcmHost> {
    provider: P,
    host: H,
    config: StreamConfig,
    state: StreamState,
    session: Option<Session<P::Channel>>,
}

impl<P: ChannelProvider, H: PcmHost> StreamController<P, H> {
    pub fn new(provider: P, host: H) -> Self {
        Self::with_config(provider, host, StreamConfig::default())
    }

    pub fn with_config(provider: P, host: H, config: StreamConfig) -> Self {
        StreamController {
            provider,
            host,
            config,
            state: StreamState::Closed,
            session: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Negotiated geometry, once configured.
    pub fn geometry(&self) -> Option<Geometry> {
        self.session.as_ref().and_then(|s| s.geometry)
    }

    pub fn stats(&self) -> StreamStats {
        self.session
            .as_ref()
            .map(|s| StreamStats {
                engine: s.engine.stats(),
                pool: s.pool.stats(),
                periods_elapsed: s.bridge.as_ref().map_or(0, RingBridge::periods_elapsed),
            })
            .unwrap_or_default()
    }

    fn check(&self, op: Operation, allowed: &[StreamState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            log::warn!("{op:?} rejected in state {:?}", self.state);
            Err(Error::InvalidStateTransition {
                from: self.state,
                op,
            })
        }
    }

    fn session_mut(&mut self, op: Operation) -> Result<&mut Session<P::Channel>> {
        let from = self.state;
        self.session
            .as_mut()
            .ok_or(Error::InvalidStateTransition { from, op })
    }

    fn enter(&mut self, next: StreamState) {
        log::info!("stream {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Acquire the DMA channel and allocate the active and spare buffers.
    ///
    /// On failure nothing stays allocated and the stream remains closed.
    pub fn open(&mut self) -> Result<()> {
        self.check(Operation::Open, &[StreamState::Closed])?;

        let name = self.config.channel_name;
        let channel = self.provider.request_channel(name).ok_or_else(|| {
            log::error!("DMA channel {name} unavailable");
            Error::ResourceExhaustion(Resource::DmaChannel)
        })?;

        let mut engine = TransferEngine::new(channel);
        let pool = BufferPool::open(&mut engine, AUDIO_BUFFER_SIZE)?;

        self.session = Some(Session {
            pool,
            engine,
            geometry: None,
            bridge: None,
        });
        self.enter(StreamState::Open);
        Ok(())
    }

    /// Negotiate the ring geometry against the hardware capabilities.
    ///
    /// A rejected configuration leaves the previous one in place.
    pub fn configure(&mut self, params: &HwParams) -> Result<Geometry> {
        self.check(
            Operation::Configure,
            &[StreamState::Open, StreamState::Configured],
        )?;

        let geometry = self.config.hardware.constrain(params)?;
        let session = self.session_mut(Operation::Configure)?;
        session.geometry = Some(geometry);
        session.bridge = Some(RingBridge::new(&geometry));

        log::info!(
            "configured {} periods of {} frames ({} bytes)",
            geometry.periods,
            geometry.period_frames,
            geometry.period_bytes()
        );
        self.enter(StreamState::Configured);
        Ok(geometry)
    }

    /// Rewind the data path to the start of the ring.
    ///
    /// Aborts whatever is still in flight, releases the abandoned buffers and
    /// reallocates a missing spare, which also recovers a stopped stream.
    pub fn prepare(&mut self) -> Result<()> {
        self.check(
            Operation::Prepare,
            &[
                StreamState::Configured,
                StreamState::Prepared,
                StreamState::Stopped,
            ],
        )?;

        let session = self.session_mut(Operation::Prepare)?;
        session.engine.terminate();
        let released = session.engine.release_abandoned();
        session.pool.reset();
        session.pool.replenish(&mut session.engine)?;
        if let Some(bridge) = session.bridge.as_mut() {
            bridge.reset();
        }
        if released > 0 {
            log::debug!("prepare released {released} abandoned buffers");
        }

        self.enter(StreamState::Prepared);
        Ok(())
    }

    /// Apply a trigger command from the host.
    pub fn trigger(&mut self, cmd: Command) -> Result<()> {
        let op = Operation::Trigger(cmd);
        let next = match (self.state, cmd) {
            (StreamState::Prepared, Command::Start) => StreamState::Running,
            (StreamState::Running | StreamState::Paused, Command::Stop) => StreamState::Prepared,
            (StreamState::Running, Command::Pause) => StreamState::Paused,
            (StreamState::Paused, Command::Resume) => StreamState::Running,
            (from, _) => {
                log::warn!("{op:?} rejected in state {from:?}");
                return Err(Error::InvalidStateTransition { from, op });
            }
        };

        let session = self.session_mut(op)?;
        match cmd {
            Command::Start => session.engine.start(),
            Command::Stop => {
                session.engine.terminate();
                session.pool.reset();
            }
            Command::Pause => session.engine.pause()?,
            Command::Resume => session.engine.resume()?,
        }

        self.enter(next);
        Ok(())
    }

    /// Drop the negotiated geometry, keeping the channel and buffers.
    pub fn hw_free(&mut self) -> Result<()> {
        self.check(
            Operation::HwFree,
            &[
                StreamState::Configured,
                StreamState::Prepared,
                StreamState::Stopped,
            ],
        )?;

        let session = self.session_mut(Operation::HwFree)?;
        session.engine.terminate();
        session.engine.release_abandoned();
        session.pool.reset();
        session.geometry = None;
        session.bridge = None;

        self.enter(StreamState::Open);
        Ok(())
    }

    /// Stop the hardware and release every buffer and the channel.
    ///
    /// Valid from any state; closing a closed stream does nothing.
    pub fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let in_flight = session.engine.release_all();
        let pooled = session.pool.close();
        log::debug!("close released {in_flight} transfer and {pooled} pool buffers");
        drop(session);

        self.enter(StreamState::Closed);
    }

    /// Pull newly written frames out of the host ring and queue them for
    /// transfer.
    ///
    /// Completed transfers are reaped first. If the data path runs out of
    /// buffers or transfer slots the hardware is stopped and the stream
    /// enters [`StreamState::Stopped`] until the next
    /// [`prepare`](Self::prepare).
    pub fn on_data_available(&mut self, ring: &RingSnapshot<'_>) -> Result<()> {
        let from = self.state;
        let session = match self.session.as_mut() {
            Some(session) if from.is_streaming() => session,
            _ => {
                log::warn!("{:?} rejected in state {from:?}", Operation::DataAvailable);
                return Err(Error::InvalidStateTransition {
                    from,
                    op: Operation::DataAvailable,
                });
            }
        };
        let running = from == StreamState::Running;
        let Session {
            pool,
            engine,
            bridge,
            ..
        } = session;

        engine.reap();
        let Some(bridge) = bridge.as_mut() else {
            return Ok(());
        };
        let frames = bridge.pull_available(ring);
        if frames == 0 {
            return Ok(());
        }

        let result = bridge.advance(
            ring,
            frames,
            |bytes| pool.write(engine, bytes),
            &mut self.host,
            running,
        );

        if let Err(err) = result {
            if err.kind() == ErrorKind::ResourceExhaustion {
                log::error!("data path exhausted ({err}), stopping stream");
                engine.terminate();
                self.enter(StreamState::Stopped);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Frame index in the host ring the hardware side will read next.
    pub fn current_hardware_position(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.bridge.as_ref())
            .map_or(0, RingBridge::hw_ptr)
    }
}

impl<P: ChannelProvider, H: PcmHost> Drop for StreamController<P, H> {
    fn drop(&mut self) {
        self.close();
    }
}
