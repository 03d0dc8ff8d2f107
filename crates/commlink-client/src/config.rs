use std::time::Duration;

use commlink_frame::{FrameConfig, DEFAULT_POLL_INTERVAL};

/// Largest datagram `send` will put on the wire.
pub const DEFAULT_MAX_SEND_SIZE: usize = 1024;

/// Receive buffer for one datagram (a typical Ethernet MTU minus IP/UDP headers).
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 1472;

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the datagram channel.
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// Outbound packets longer than this are truncated. Default: 1024.
    pub max_send_size: usize,
    /// Inbound packets longer than this are cut by the OS. Default: 1472.
    pub recv_buffer_size: usize,
    /// How long a receive poll waits before reporting "nothing ready".
    pub poll_interval: Duration,
    /// Send the bootstrap packet right after the socket is associated.
    pub send_bootstrap: bool,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            max_send_size: DEFAULT_MAX_SEND_SIZE,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            send_bootstrap: true,
        }
    }
}

/// Configuration for a whole [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Reliable channel framing and timeouts.
    pub frame: FrameConfig,
    /// Datagram channel sizes and polling.
    pub datagram: DatagramConfig,
    /// TCP connect timeout; `None` leaves it to the OS.
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            datagram: DatagramConfig::default(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }
}

impl TransportConfig {
    /// Use `interval` as the receive poll interval of both channels.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.frame.poll_interval = interval;
        self.datagram.poll_interval = interval;
        self
    }
}
