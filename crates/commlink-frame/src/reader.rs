use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use commlink_transport::poll::Readiness;
use commlink_transport::StreamSocket;

use crate::codec::{decode_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::PeerClosed)` when EOF falls on a frame
    /// boundary and `Err(FrameError::ShortRead)` when it falls inside one.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = self.decode_buffered()? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(self.eof_error());
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Decode a message already sitting in the read buffer, if any.
    pub fn decode_buffered(&mut self) -> Result<Option<Bytes>> {
        decode_frame(
            &mut self.buf,
            self.config.header_format,
            self.config.max_payload_size,
        )
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn eof_error(&self) -> FrameError {
        if self.buf.is_empty() {
            return FrameError::PeerClosed;
        }

        let header_len = self.config.header_format.header_len();
        if self.buf.len() < header_len {
            return FrameError::ShortRead {
                expected: header_len,
                received: self.buf.len(),
            };
        }

        // Header already validated by decode_frame on the previous pass.
        let expected = self
            .config
            .header_format
            .decode_header(&self.buf[..header_len])
            .unwrap_or(0);
        FrameError::ShortRead {
            expected,
            received: self.buf.len() - header_len,
        }
    }
}

impl FrameReader<StreamSocket> {
    /// Create a frame reader for a TCP stream and apply the in-frame read
    /// timeout from config.
    pub fn with_config_socket(inner: StreamSocket, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Wait up to one poll interval for a message.
    ///
    /// `Ok(None)` means nothing arrived this cycle. Once the socket turns
    /// readable the whole frame is read, bounded by the read timeout.
    pub fn poll_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode_buffered()? {
            return Ok(Some(frame));
        }

        match self
            .inner
            .poll_readable(self.config.poll_interval)
            .map_err(transport_to_frame_error)?
        {
            Readiness::Idle => Ok(None),
            Readiness::Ready => self.read_frame().map(Some),
        }
    }
}

pub(crate) fn transport_to_frame_error(err: commlink_transport::TransportError) -> FrameError {
    match err {
        commlink_transport::TransportError::Io(io) => FrameError::Io(io),
        commlink_transport::TransportError::Connect { source, .. }
        | commlink_transport::TransportError::Resolve { source, .. }
        | commlink_transport::TransportError::Bind { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
