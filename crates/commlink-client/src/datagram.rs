use std::fmt;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use commlink_transport::poll::Readiness;
use commlink_transport::{DatagramSocket, Endpoint, TransportError};
use tracing::{debug, info, warn};

use crate::config::DatagramConfig;
use crate::error::{ClientError, Result};
use crate::receive_loop::{ReceiveLoop, UnitSource};
use crate::state::{lock, ChannelState, StateCell};

const CHANNEL: &str = "udp";

/// First packet on every datagram channel, ahead of any application data.
///
/// Servers use it to learn the client's address through NATs and
/// firewalls. The exact bytes are part of the wire protocol.
pub const BOOTSTRAP_PACKET: &[u8] = b"010011000111";

/// Unreliable packet channel over one UDP socket.
///
/// Each `send` is one datagram and each delivered unit is one datagram;
/// packets are never merged or split.
pub struct DatagramChannel {
    config: DatagramConfig,
    state: StateCell,
    socket: Mutex<Option<DatagramSocket>>,
    receiver: Mutex<Option<ReceiveLoop>>,
    peer: Mutex<Option<SocketAddr>>,
}

impl DatagramChannel {
    pub fn new(config: DatagramConfig) -> Self {
        Self {
            config,
            state: StateCell::new(),
            socket: Mutex::new(None),
            receiver: Mutex::new(None),
            peer: Mutex::new(None),
        }
    }

    /// Associate with `endpoint`, send the bootstrap packet and start the
    /// receive loop.
    pub fn connect<F>(&self, endpoint: &Endpoint, on_packet: F) -> Result<()>
    where
        F: FnMut(Bytes) + Send + 'static,
    {
        self.state
            .transition(ChannelState::Unstarted, ChannelState::Connecting)
            .map_err(|state| ClientError::AlreadyStarted {
                channel: CHANNEL,
                state,
            })?;

        let (socket, source) = match self.open_socket(endpoint) {
            Ok(parts) => parts,
            Err(err) => {
                self.state.close();
                return Err(err);
            }
        };

        *lock(&self.peer) = Some(socket.peer_addr());
        *lock(&self.socket) = Some(socket);
        if !self.state.open() {
            lock(&self.socket).take();
            return Err(ClientError::NotOpen {
                channel: CHANNEL,
                state: self.state.get(),
            });
        }

        let name = format!("commlink-udp-{}", endpoint.port());
        let receiver = ReceiveLoop::spawn(name, source, self.state.clone(), on_packet).map_err(
            |err| {
                self.state.close();
                lock(&self.socket).take();
                ClientError::Spawn(err)
            },
        )?;
        *lock(&self.receiver) = Some(receiver);

        if self.state.get() == ChannelState::Closed {
            self.stop_receiver();
        }

        info!(%endpoint, "udp channel open");
        Ok(())
    }

    fn open_socket(&self, endpoint: &Endpoint) -> Result<(DatagramSocket, DatagramSource)> {
        let socket = DatagramSocket::connect(endpoint)?;
        if self.config.send_bootstrap {
            socket.send(BOOTSTRAP_PACKET)?;
            debug!(%endpoint, "sent udp bootstrap packet");
        }

        let source = DatagramSource {
            socket: socket.try_clone()?,
            buf: vec![0u8; self.config.recv_buffer_size],
            poll_interval: self.config.poll_interval,
        };
        Ok((socket, source))
    }

    /// Send one datagram, returning the bytes sent.
    ///
    /// Empty packets send nothing and return 0 in any state. Packets longer
    /// than `max_send_size` are truncated.
    pub fn send(&self, packet: &[u8]) -> Result<usize> {
        if packet.is_empty() {
            return Ok(0);
        }
        let state = self.state.get();
        if state != ChannelState::Open {
            return Err(ClientError::NotOpen {
                channel: CHANNEL,
                state,
            });
        }

        let max = self.config.max_send_size;
        let packet = if packet.len() > max {
            warn!(size = packet.len(), max, "truncating oversized datagram");
            &packet[..max]
        } else {
            packet
        };

        let guard = lock(&self.socket);
        let socket = guard.as_ref().ok_or(ClientError::NotOpen {
            channel: CHANNEL,
            state: self.state.get(),
        })?;
        Ok(socket.send(packet)?)
    }

    /// Stop the receive loop, then release the socket. Safe to repeat.
    pub fn stop(&self) {
        let previous = self.state.close();
        self.stop_receiver();
        lock(&self.socket).take();
        if previous != ChannelState::Closed {
            debug!("udp channel stopped");
        }
    }

    fn stop_receiver(&self) {
        let receiver = lock(&self.receiver).take();
        if let Some(mut receiver) = receiver {
            receiver.stop();
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state.get() == ChannelState::Open
    }

    /// Address the channel was associated with, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.peer)
    }

    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }
}

impl Default for DatagramChannel {
    fn default() -> Self {
        Self::new(DatagramConfig::default())
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("state", &self.state.get())
            .field("peer", &self.peer_addr())
            .finish()
    }
}

struct DatagramSource {
    socket: DatagramSocket,
    buf: Vec<u8>,
    poll_interval: Duration,
}

impl UnitSource for DatagramSource {
    type Unit = Bytes;
    type Error = TransportError;

    fn poll_unit(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        match self.socket.poll_readable(self.poll_interval)? {
            Readiness::Idle => Ok(None),
            Readiness::Ready => {
                let n = self.socket.recv(&mut self.buf)?;
                if n == 0 {
                    return Err(TransportError::Shutdown);
                }
                Ok(Some(Bytes::copy_from_slice(&self.buf[..n])))
            }
        }
    }

    fn is_peer_closed(err: &TransportError) -> bool {
        matches!(err, TransportError::Shutdown)
    }
}
