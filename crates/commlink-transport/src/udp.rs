use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::poll::Readiness;

/// A UDP socket associated with a single peer.
///
/// Binding to the peer is a convenience: it filters inbound packets to that
/// peer and lets `send`/`recv` skip addressing. There is no handshake, so
/// an unreachable peer only shows up later as a send or receive error.
pub struct DatagramSocket {
    inner: UdpSocket,
    peer: SocketAddr,
}

impl DatagramSocket {
    /// Bind an ephemeral local socket and associate it with `endpoint`.
    ///
    /// The first resolved address of the endpoint is used; the local bind
    /// matches its address family.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        // resolve() never returns an empty list.
        let peer = endpoint.resolve()?[0];
        let local: SocketAddr = if peer.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket =
            UdpSocket::bind(local).map_err(|source| TransportError::Bind { addr: local, source })?;
        socket
            .connect(peer)
            .map_err(|source| TransportError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;

        debug!(%endpoint, %peer, local = ?socket.local_addr().ok(), "associated udp socket");
        Ok(Self {
            inner: socket,
            peer,
        })
    }

    /// Send one datagram to the associated peer.
    pub fn send(&self, packet: &[u8]) -> Result<usize> {
        self.inner.send(packet).map_err(Into::into)
    }

    /// Receive one datagram into `buf`, returning its length.
    ///
    /// A datagram larger than `buf` is cut at `buf.len()` by the OS.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.inner.recv(buf).map_err(Into::into)
    }

    /// Wait up to `timeout` for a datagram to arrive.
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

    /// Try to clone this socket (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            peer: self.peer,
        })
    }

    /// The associated peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of this socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

impl std::fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("peer", &self.peer)
            .field("local", &self.inner.local_addr().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_send_and_recv() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());

        let client = DatagramSocket::connect(&endpoint).unwrap();
        assert_eq!(client.peer_addr(), server.local_addr().unwrap());

        let sent = client.send(b"ping").unwrap();
        assert_eq!(sent, 4);

        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from.port(), client.local_addr().unwrap().port());

        server.send_to(b"pong", from).unwrap();
        assert_eq!(
            client.poll_readable(Duration::from_secs(1)).unwrap(),
            Readiness::Ready
        );
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn idle_poll_times_out() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let client = DatagramSocket::connect(&endpoint).unwrap();

        let outcome = client.poll_readable(Duration::from_millis(30)).unwrap();
        assert_eq!(outcome, Readiness::Idle);
    }

    #[test]
    fn packets_keep_their_boundaries() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let client = DatagramSocket::connect(&endpoint).unwrap();
        client.send(b"hi").unwrap();
        let mut probe = [0u8; 8];
        let (_, client_addr) = server.recv_from(&mut probe).unwrap();

        server.send_to(b"one", client_addr).unwrap();
        server.send_to(b"three", client_addr).unwrap();

        let mut buf = [0u8; 64];
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"one");
        let n = client.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"three");
    }
}
