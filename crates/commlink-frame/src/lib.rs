//! Length-prefixed message framing over a reliable byte stream.
//!
//! Every message is written as a fixed-width length header followed by the
//! payload bytes. Two header encodings exist in the field and both are
//! supported (see [`HeaderFormat`]):
//! - `Binary`: 4-byte little-endian payload length
//! - `Decimal`: 12 ASCII bytes, the decimal length right-aligned with spaces
//!
//! A declared length of zero is a protocol violation, not an empty message.
//! Readers hand back exactly one message per frame; callers never see
//! partial reads.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, FrameConfig, HeaderFormat, BINARY_HEADER_SIZE,
    DECIMAL_HEADER_SIZE, DEFAULT_MAX_PAYLOAD, DEFAULT_POLL_INTERVAL,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
