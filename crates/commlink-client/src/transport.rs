use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use commlink_transport::Endpoint;
use tracing::{debug, error, info, warn};

use crate::config::{DatagramConfig, TransportConfig};
use crate::control::{classify, ControlEnvelope, Inbound, ACTION_CREATE_UDP_CHANNEL};
use crate::datagram::DatagramChannel;
use crate::error::Result;
use crate::state::lock;
use crate::stream::FramedStream;

/// Callback receiving one payload.
pub type PayloadHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Application sinks for received payloads.
///
/// `on_data` runs on the reliable channel's receive thread, `on_datagram`
/// on the datagram channel's. Unset handlers drop what they receive.
#[derive(Clone)]
pub struct Handlers {
    on_data: PayloadHandler,
    on_datagram: PayloadHandler,
}

impl Handlers {
    pub fn new() -> Self {
        Self {
            on_data: Arc::new(|payload: Bytes| debug!(len = payload.len(), "dropping tcp payload")),
            on_datagram: Arc::new(|payload: Bytes| {
                debug!(len = payload.len(), "dropping udp payload")
            }),
        }
    }

    /// Sink for reliable-channel payloads.
    pub fn on_data(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.on_data = Arc::new(handler);
        self
    }

    /// Sink for datagram-channel payloads.
    pub fn on_datagram(mut self, handler: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        self.on_datagram = Arc::new(handler);
        self
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers").finish_non_exhaustive()
    }
}

/// Coarse lifecycle of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Not connected yet.
    Created,
    /// Reliable channel open, no datagram channel.
    Connected,
    /// Datagram channel requested; waiting for the server's port.
    UdpRequested,
    /// Both channels open.
    UdpOpen,
    /// Closed explicitly, or the reliable channel died.
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Created => "created",
            TransportState::Connected => "connected",
            TransportState::UdpRequested => "udp_requested",
            TransportState::UdpOpen => "udp_open",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Client side of one server session.
///
/// Owns the reliable [`FramedStream`] and, once the server announces a
/// port, one [`DatagramChannel`] to the same host. All sends run on the
/// caller's thread.
pub struct Transport {
    stream: FramedStream,
    shared: Arc<Shared>,
}

struct Shared {
    endpoint: Endpoint,
    datagram_config: DatagramConfig,
    datagram: Mutex<Option<DatagramChannel>>,
    handlers: Handlers,
    closed: AtomicBool,
    udp_requested: AtomicBool,
}

impl Transport {
    pub fn new(endpoint: Endpoint, config: TransportConfig, handlers: Handlers) -> Self {
        let TransportConfig {
            frame,
            datagram,
            connect_timeout,
        } = config;

        Self {
            stream: FramedStream::new(frame, connect_timeout),
            shared: Arc::new(Shared {
                endpoint,
                datagram_config: datagram,
                datagram: Mutex::new(None),
                handlers,
                closed: AtomicBool::new(false),
                udp_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Open the reliable channel and start dispatching inbound messages.
    pub fn connect(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        self.stream
            .connect(&self.shared.endpoint, move |message| shared.dispatch(message))?;
        info!(endpoint = %self.shared.endpoint, "transport connected");
        Ok(())
    }

    /// Ask the server for a datagram channel.
    ///
    /// Returns once the request is sent. The channel opens later, when the
    /// server's `create_udp_channel` reply reaches the receive loop.
    pub fn request_udp_channel(&self) -> Result<usize> {
        let sent = self.send_envelope(&ControlEnvelope::create_udp_channel())?;
        self.shared.udp_requested.store(true, Ordering::Release);
        Ok(sent)
    }

    pub fn send_data(&self, payload: &str) -> Result<usize> {
        self.send_envelope(&ControlEnvelope::data(payload))
    }

    /// Send a payload for the server to relay to its other clients.
    pub fn broadcast(&self, payload: &str) -> Result<usize> {
        self.send_envelope(&ControlEnvelope::broadcast(payload))
    }

    pub fn update_user(&self, info: &str) -> Result<usize> {
        self.send_envelope(&ControlEnvelope::update_user(info))
    }

    pub fn update_status(&self, status: &str) -> Result<usize> {
        self.send_envelope(&ControlEnvelope::update_status(status))
    }

    pub fn list_clients(&self) -> Result<usize> {
        self.send_envelope(&ControlEnvelope::list_clients())
    }

    /// Send any envelope over the reliable channel.
    pub fn send_envelope(&self, envelope: &ControlEnvelope) -> Result<usize> {
        let raw = envelope.to_bytes()?;
        let sent = self.stream.send(&raw)?;
        debug!(action = %envelope.action, len = raw.len(), "sent envelope");
        Ok(sent)
    }

    /// Send one datagram. Without a datagram channel this sends nothing
    /// and returns 0.
    pub fn send_udp(&self, packet: &[u8]) -> Result<usize> {
        let guard = lock(&self.shared.datagram);
        match guard.as_ref() {
            Some(channel) => channel.send(packet),
            None => {
                debug!(len = packet.len(), "no udp channel; datagram dropped");
                Ok(0)
            }
        }
    }

    /// Stop the reliable channel, then the datagram channel. Safe to repeat.
    pub fn close(&self) {
        let first = !self.shared.closed.swap(true, Ordering::AcqRel);

        // Reliable loop first: its dispatcher is what opens datagram channels.
        self.stream.stop();
        let datagram = lock(&self.shared.datagram).take();
        if let Some(channel) = datagram {
            channel.stop();
        }

        if first {
            info!(endpoint = %self.shared.endpoint, "transport closed");
        }
    }

    /// Whether the reliable channel is still open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_open()
    }

    pub fn has_udp_channel(&self) -> bool {
        lock(&self.shared.datagram).is_some()
    }

    pub fn udp_is_open(&self) -> bool {
        lock(&self.shared.datagram)
            .as_ref()
            .is_some_and(DatagramChannel::is_open)
    }

    /// Server address of the datagram channel, if one exists.
    pub fn udp_peer(&self) -> Option<SocketAddr> {
        lock(&self.shared.datagram)
            .as_ref()
            .and_then(DatagramChannel::peer_addr)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub fn state(&self) -> TransportState {
        use crate::state::ChannelState;

        if self.shared.closed.load(Ordering::Acquire) {
            return TransportState::Closed;
        }
        match self.stream.state() {
            ChannelState::Unstarted | ChannelState::Connecting => TransportState::Created,
            ChannelState::Closed => TransportState::Closed,
            ChannelState::Open if self.udp_is_open() => TransportState::UdpOpen,
            ChannelState::Open if self.shared.udp_requested.load(Ordering::Acquire) => {
                TransportState::UdpRequested
            }
            ChannelState::Open => TransportState::Connected,
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn dispatch(&self, message: Bytes) {
        match classify(message) {
            Inbound::Data(payload) => (self.handlers.on_data)(payload),
            Inbound::CreateUdpChannel(port) => {
                self.open_datagram(port);
                self.udp_requested.store(false, Ordering::Release);
            }
            Inbound::Malformed { action, reason } => {
                if action == ACTION_CREATE_UDP_CHANNEL {
                    self.udp_requested.store(false, Ordering::Release);
                }
                warn!(%action, %reason, "dropping malformed control message");
            }
        }
    }

    fn open_datagram(&self, port: u16) {
        if self.closed.load(Ordering::Acquire) {
            debug!(port, "transport closed; ignoring udp channel announcement");
            return;
        }

        let stale = {
            let mut slot = lock(&self.datagram);
            if let Some(existing) = slot.as_ref().filter(|channel| channel.is_open()) {
                warn!(port, peer = ?existing.peer_addr(), "udp channel already open; ignoring announcement");
                return;
            }
            slot.take()
        };
        if let Some(stale) = stale {
            stale.stop();
        }

        let endpoint = self.endpoint.with_port(port);
        let channel = DatagramChannel::new(self.datagram_config.clone());
        let on_datagram = Arc::clone(&self.handlers.on_datagram);
        if let Err(err) = channel.connect(&endpoint, move |packet| on_datagram(packet)) {
            error!(%endpoint, error = %err, "failed to open udp channel");
            return;
        }

        *lock(&self.datagram) = Some(channel);
        if self.closed.load(Ordering::Acquire) {
            let late = lock(&self.datagram).take();
            if let Some(late) = late {
                late.stop();
            }
        }
    }
}
