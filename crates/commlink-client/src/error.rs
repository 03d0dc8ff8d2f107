use crate::state::ChannelState;

/// Errors that can occur in client channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (resolution, connect, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] commlink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] commlink_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The channel is not open for sending.
    #[error("{channel} channel is not open (state: {state})")]
    NotOpen {
        channel: &'static str,
        state: ChannelState,
    },

    /// The channel was already started once; channels are single-use.
    #[error("{channel} channel already started (state: {state})")]
    AlreadyStarted {
        channel: &'static str,
        state: ChannelState,
    },

    /// The receive loop thread could not be spawned.
    #[error("failed to spawn receive loop: {0}")]
    Spawn(std::io::Error),

    /// A `create_udp_channel` response carried something other than a port.
    #[error("invalid udp port {0:?}")]
    InvalidPort(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
