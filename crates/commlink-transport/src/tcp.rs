use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::poll::Readiness;

/// A connected TCP stream. Implements `Read + Write`.
///
/// This is the reliable connection underneath the framed channel. The
/// receive side usually works on a [`try_clone`](Self::try_clone)d handle
/// while the send side keeps the original.
pub struct StreamSocket {
    inner: TcpStream,
}

impl StreamSocket {
    /// Connect to `endpoint`, trying each resolved address in turn.
    ///
    /// With `timeout = None` the OS connect timeout applies.
    pub fn connect(endpoint: &Endpoint, timeout: Option<Duration>) -> Result<Self> {
        let addrs = endpoint.resolve()?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    // Frames go out as a single write; don't let Nagle hold them back.
                    stream.set_nodelay(true)?;
                    debug!(%endpoint, %addr, "connected tcp stream");
                    return Ok(Self::from_std(stream));
                }
                Err(err) => {
                    debug!(%endpoint, %addr, error = %err, "tcp connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            endpoint: endpoint.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no address to connect to")
            }),
        })
    }

    /// Wrap an already-connected std stream.
    pub fn from_std(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Wait up to `timeout` for the stream to become readable.
    pub fn poll_readable(&self, timeout: Duration) -> Result<Readiness> {
        #[cfg(unix)]
        {
            use std::os::fd::AsRawFd;
            crate::poll::wait_readable(self.inner.as_raw_fd(), timeout).map_err(Into::into)
        }

        #[cfg(not(unix))]
        {
            let previous = self.inner.read_timeout()?;
            self.inner.set_read_timeout(Some(timeout))?;
            let mut probe = [0u8; 1];
            let outcome = crate::poll::peek_outcome(self.inner.peek(&mut probe));
            self.inner.set_read_timeout(previous)?;
            outcome.map_err(Into::into)
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_std(cloned))
    }

    /// Shut down both directions.
    ///
    /// A stream the peer already tore down reports `NotConnected`; that is
    /// treated as success.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_how(Shutdown::Both)
    }

    /// Shut down the read direction only.
    ///
    /// A read blocked on this socket or any clone of it returns EOF at once.
    /// Sends keep working.
    pub fn shutdown_read(&self) -> Result<()> {
        self.shutdown_how(Shutdown::Read)
    }

    fn shutdown_how(&self, how: Shutdown) -> Result<()> {
        match self.inner.shutdown(how) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Local address of this end.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

impl Read for StreamSocket {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for StreamSocket {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for StreamSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSocket")
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}
