use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use commlink_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use commlink_transport::{Endpoint, StreamSocket};
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::receive_loop::{ReceiveLoop, UnitSource};
use crate::state::{lock, ChannelState, StateCell};

const CHANNEL: &str = "tcp";

/// Reliable, message-framed channel over one TCP connection.
///
/// Single-use: `connect` once, `send` while open, `stop` when done. Inbound
/// messages are handed to the callback on a dedicated receive thread.
pub struct FramedStream {
    config: FrameConfig,
    connect_timeout: Option<Duration>,
    state: StateCell,
    writer: Mutex<Option<FrameWriter<StreamSocket>>>,
    receiver: Mutex<Option<ReceiveLoop>>,
}

impl FramedStream {
    pub fn new(config: FrameConfig, connect_timeout: Option<Duration>) -> Self {
        Self {
            config,
            connect_timeout,
            state: StateCell::new(),
            writer: Mutex::new(None),
            receiver: Mutex::new(None),
        }
    }

    /// Connect to `endpoint` and start the receive loop.
    ///
    /// Connect failures are returned and leave the channel closed.
    pub fn connect<F>(&self, endpoint: &Endpoint, on_message: F) -> Result<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.state
            .transition(ChannelState::Unstarted, ChannelState::Connecting)
            .map_err(|state| ClientError::AlreadyStarted {
                channel: CHANNEL,
                state,
            })?;

        let (reader, writer) = match self.open_socket(endpoint) {
            Ok(halves) => halves,
            Err(err) => {
                self.state.close();
                return Err(err);
            }
        };

        *lock(&self.writer) = Some(writer);
        if !self.state.open() {
            self.shutdown_writer();
            return Err(ClientError::NotOpen {
                channel: CHANNEL,
                state: self.state.get(),
            });
        }

        let name = format!("commlink-tcp-{}", endpoint.port());
        let receiver = ReceiveLoop::spawn(name, StreamSource(reader), self.state.clone(), on_message)
            .map_err(|err| {
                self.state.close();
                self.shutdown_writer();
                ClientError::Spawn(err)
            })?;
        *lock(&self.receiver) = Some(receiver);

        // stop() may have run while the loop was being spawned.
        if self.state.get() == ChannelState::Closed {
            self.stop_receiver();
        }

        info!(%endpoint, format = ?self.config.header_format, "tcp channel open");
        Ok(())
    }

    fn open_socket(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(FrameReader<StreamSocket>, FrameWriter<StreamSocket>)> {
        let socket = StreamSocket::connect(endpoint, self.connect_timeout)?;
        let read_half = socket.try_clone()?;
        let reader = FrameReader::with_config_socket(read_half, self.config.clone())?;
        let writer = FrameWriter::with_config_socket(socket, self.config.clone())?;
        Ok((reader, writer))
    }

    /// Frame and send one message, returning bytes written (header included).
    ///
    /// Empty messages send nothing and return 0 in any state. Messages above
    /// the configured maximum are truncated.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        let state = self.state.get();
        if state != ChannelState::Open {
            return Err(ClientError::NotOpen {
                channel: CHANNEL,
                state,
            });
        }

        let mut guard = lock(&self.writer);
        let writer = guard.as_mut().ok_or(ClientError::NotOpen {
            channel: CHANNEL,
            state: self.state.get(),
        })?;
        Ok(writer.send(payload)?)
    }

    /// Stop the receive loop, then close the socket. Safe to repeat.
    ///
    /// The read side is shut down before the loop is joined, so a frame that
    /// is only partly received does not hold `stop` for the read timeout.
    pub fn stop(&self) {
        let previous = self.state.close();
        self.shutdown_reads();
        self.stop_receiver();
        self.shutdown_writer();
        if previous != ChannelState::Closed {
            debug!("tcp channel stopped");
        }
    }

    fn stop_receiver(&self) {
        let receiver = lock(&self.receiver).take();
        if let Some(mut receiver) = receiver {
            receiver.stop();
        }
    }

    fn shutdown_reads(&self) {
        let guard = lock(&self.writer);
        if let Some(writer) = guard.as_ref() {
            if let Err(err) = writer.get_ref().shutdown_read() {
                debug!(error = %err, "tcp read shutdown failed");
            }
        }
    }

    fn shutdown_writer(&self) {
        let writer = lock(&self.writer).take();
        if let Some(writer) = writer {
            if let Err(err) = writer.get_ref().shutdown() {
                debug!(error = %err, "tcp shutdown failed");
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    /// True until the channel is stopped or its receive loop dies.
    pub fn is_open(&self) -> bool {
        self.state.get() == ChannelState::Open
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for FramedStream {
    fn default() -> Self {
        Self::new(FrameConfig::default(), None)
    }
}

impl Drop for FramedStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for FramedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedStream")
            .field("state", &self.state.get())
            .field("format", &self.config.header_format)
            .finish()
    }
}

struct StreamSource(FrameReader<StreamSocket>);

impl UnitSource for StreamSource {
    type Unit = Bytes;
    type Error = FrameError;

    fn poll_unit(&mut self) -> std::result::Result<Option<Bytes>, FrameError> {
        self.0.poll_frame()
    }

    fn is_peer_closed(err: &FrameError) -> bool {
        matches!(err, FrameError::PeerClosed)
    }
}
