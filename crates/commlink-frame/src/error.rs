/// Errors that can occur during frame encoding/decoding.
///
/// Every variant except [`FrameError::PayloadTooLarge`] on the send side is
/// fatal to the stream: framing state cannot be resynchronized afterwards.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length header could not be parsed.
    #[error("invalid frame header {0:?}")]
    InvalidHeader(String),

    /// The header declared a length of zero or less.
    #[error("invalid declared length {0} (must be positive)")]
    NonPositiveLength(i64),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The peer closed the connection cleanly between frames.
    #[error("connection closed by peer")]
    PeerClosed,

    /// The connection ended before a complete frame was received.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
