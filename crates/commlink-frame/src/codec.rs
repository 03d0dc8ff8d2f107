use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Binary header: 4-byte little-endian length.
pub const BINARY_HEADER_SIZE: usize = 4;

/// Decimal header: 12 ASCII bytes, right-aligned, space padded.
pub const DECIMAL_HEADER_SIZE: usize = 12;

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Default readiness poll interval for receive loops.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Encoding of the fixed-width length header.
///
/// Sender and receiver must agree; nothing on the wire says which one is in
/// use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HeaderFormat {
    /// `u32` little-endian.
    #[default]
    Binary,
    /// `format!("{:>12}", len)` in ASCII.
    Decimal,
}

impl HeaderFormat {
    /// Header width in bytes.
    pub const fn header_len(self) -> usize {
        match self {
            HeaderFormat::Binary => BINARY_HEADER_SIZE,
            HeaderFormat::Decimal => DECIMAL_HEADER_SIZE,
        }
    }

    /// Append the header for a payload of `len` bytes.
    pub fn encode_header(self, len: usize, dst: &mut BytesMut) -> Result<()> {
        if len > u32::MAX as usize {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: u32::MAX as usize,
            });
        }
        match self {
            HeaderFormat::Binary => dst.put_u32_le(len as u32),
            HeaderFormat::Decimal => {
                dst.put_slice(format!("{len:>width$}", width = DECIMAL_HEADER_SIZE).as_bytes())
            }
        }
        Ok(())
    }

    /// Parse a complete header into the declared payload length.
    ///
    /// `header` must be exactly [`header_len`](Self::header_len) bytes.
    pub fn decode_header(self, header: &[u8]) -> Result<usize> {
        if header.len() != self.header_len() {
            return Err(FrameError::InvalidHeader(format!(
                "expected {} header bytes, got {}",
                self.header_len(),
                header.len()
            )));
        }

        let declared: i64 = match self {
            HeaderFormat::Binary => {
                let mut raw = [0u8; BINARY_HEADER_SIZE];
                raw.copy_from_slice(header);
                i64::from(u32::from_le_bytes(raw))
            }
            HeaderFormat::Decimal => {
                let text = std::str::from_utf8(header)
                    .map_err(|_| FrameError::InvalidHeader(String::from_utf8_lossy(header).into()))?;
                text.trim()
                    .parse::<i64>()
                    .map_err(|_| FrameError::InvalidHeader(text.to_string()))?
            }
        };

        if declared <= 0 {
            return Err(FrameError::NonPositiveLength(declared));
        }
        usize::try_from(declared).map_err(|_| FrameError::InvalidHeader(declared.to_string()))
    }
}

/// Encode one message into the wire format.
///
/// ```text
/// ┌──────────────────────┬──────────────────┐
/// │ Length header        │ Payload          │
/// │ 4B LE  | 12B decimal │ (Length bytes)   │
/// └──────────────────────┴──────────────────┘
/// ```
///
/// Empty payloads are rejected: a zero length header is not a valid frame.
pub fn encode_frame(format: HeaderFormat, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::NonPositiveLength(0));
    }
    dst.reserve(format.header_len() + payload.len());
    format.encode_header(payload.len(), dst)?;
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(
    src: &mut BytesMut,
    format: HeaderFormat,
    max_payload: usize,
) -> Result<Option<Bytes>> {
    let header_len = format.header_len();
    if src.len() < header_len {
        return Ok(None); // Need more data
    }

    let payload_len = format.decode_header(&src[..header_len])?;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = header_len + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(header_len);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for the framed stream.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Larger outbound messages are
    /// truncated; larger inbound declarations are fatal. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Length header encoding. Default: binary.
    pub header_format: HeaderFormat,
    /// How long a receive poll waits before reporting "nothing ready".
    pub poll_interval: Duration,
    /// Read timeout once a frame has started arriving.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking sends.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            header_format: HeaderFormat::Binary,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, commlink!";

        encode_frame(HeaderFormat::Binary, payload, &mut buf).unwrap();
        assert_eq!(buf.len(), BINARY_HEADER_SIZE + payload.len());

        let frame = decode_frame(&mut buf, HeaderFormat::Binary, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_binary_header_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(HeaderFormat::Binary, &[0xAA; 258], &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x02, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_decimal_header_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(HeaderFormat::Decimal, b"Welcome!", &mut buf).unwrap();
        assert_eq!(&buf[..], b"           8Welcome!");
    }

    #[test]
    fn test_decimal_header_accepts_left_aligned() {
        let len = HeaderFormat::Decimal.decode_header(b"42          ").unwrap();
        assert_eq!(len, 42);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x05, 0x00][..]);
        let result = decode_frame(&mut buf, HeaderFormat::Binary, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(HeaderFormat::Binary, b"hello", &mut buf).unwrap();
        buf.truncate(BINARY_HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, HeaderFormat::Binary, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_zero_length_header_is_fatal() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, HeaderFormat::Binary, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::NonPositiveLength(0))));

        let mut buf = BytesMut::from(&b"           0"[..]);
        let result = decode_frame(&mut buf, HeaderFormat::Decimal, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::NonPositiveLength(0))));
    }

    #[test]
    fn test_negative_decimal_length_is_fatal() {
        let result = HeaderFormat::Decimal.decode_header(b"          -7");
        assert!(matches!(result, Err(FrameError::NonPositiveLength(-7))));
    }

    #[test]
    fn test_garbage_decimal_header() {
        let result = HeaderFormat::Decimal.decode_header(b"{\"action\":\"d");
        assert!(matches!(result, Err(FrameError::InvalidHeader(_))));
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, HeaderFormat::Binary, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(HeaderFormat::Decimal, b"first", &mut buf).unwrap();
        encode_frame(HeaderFormat::Decimal, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, HeaderFormat::Decimal, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.as_ref(), b"first");

        let f2 = decode_frame(&mut buf, HeaderFormat::Decimal, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(HeaderFormat::Binary, b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::NonPositiveLength(0)));
        assert!(buf.is_empty());
    }
}
