//! UDP socket wrapper and UDP-backed network connection
//!
//! Sockets are created through `socket2` so buffer sizes and address reuse
//! can be configured before binding, then kept in non-blocking mode.

use crate::connection::NetworkConnection;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid socket address")]
    InvalidAddress,
}

impl From<SocketError> for io::Error {
    fn from(err: SocketError) -> Self {
        match err {
            SocketError::Io(e) => e,
            SocketError::InvalidAddress => io::Error::new(ErrorKind::InvalidInput, err),
        }
    }
}

/// Non-blocking UDP socket
pub struct RudpSocket {
    inner: UdpSocket,
}

impl RudpSocket {
    /// Create a new socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        Ok(RudpSocket {
            inner: socket.into(),
        })
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the send buffer size
    pub fn send_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).send_buffer_size()?)
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).recv_buffer_size()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Send data to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, target)?)
    }

    /// Receive one datagram.
    ///
    /// Returns `WouldBlock` (wrapped in `SocketError::Io`) when empty.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        Ok(self.inner.recv_from(buf)?)
    }

    /// Wait until a datagram is queued or `timeout` elapses
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool, SocketError> {
        let mut probe = [0u8; 1];

        if timeout.is_zero() {
            return Ok(peek_ready(self.inner.peek_from(&mut probe)));
        }

        self.inner.set_nonblocking(false)?;
        self.inner.set_read_timeout(Some(timeout))?;
        let result = self.inner.peek_from(&mut probe);
        self.inner.set_read_timeout(None)?;
        self.inner.set_nonblocking(true)?;

        Ok(peek_ready(result))
    }

    /// Get a reference to the underlying socket
    pub fn as_udp_socket(&self) -> &UdpSocket {
        &self.inner
    }
}

fn peek_ready(result: io::Result<(usize, SocketAddr)>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => false,
        // Anything else (e.g. a truncated peek) is surfaced by the next receive
        Err(_) => true,
    }
}

/// How a [`UdpConnection`] finds its peer
#[derive(Debug, Clone, Copy)]
enum Role {
    /// Send to a fixed receiver address from an ephemeral port
    Connect(SocketAddr),
    /// Bind a well-known address and reply to whoever sent last
    Listen(SocketAddr),
}

/// UDP implementation of [`NetworkConnection`]
pub struct UdpConnection {
    role: Role,
    socket: Option<RudpSocket>,
    peer: Option<SocketAddr>,
    recv_buffer_size: Option<usize>,
}

impl UdpConnection {
    /// Sender side: stream to `peer`
    pub fn connect_to(peer: SocketAddr) -> Self {
        UdpConnection {
            role: Role::Connect(peer),
            socket: None,
            peer: Some(peer),
            recv_buffer_size: None,
        }
    }

    /// Receiver side: listen on `bind_addr` and learn the peer from traffic
    pub fn listen_on(bind_addr: SocketAddr) -> Self {
        UdpConnection {
            role: Role::Listen(bind_addr),
            socket: None,
            peer: None,
            recv_buffer_size: None,
        }
    }

    /// Request a kernel receive buffer of `size` bytes when opened
    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    /// Local address once opened
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Current peer address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn socket(&self) -> io::Result<&RudpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "connection is not open"))
    }
}

impl NetworkConnection for UdpConnection {
    fn open(&mut self) -> io::Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let bind_addr: SocketAddr = match self.role {
            Role::Connect(peer) if peer.ip().is_loopback() && peer.is_ipv4() => {
                "127.0.0.1:0".parse().map_err(|_| SocketError::InvalidAddress)?
            }
            Role::Connect(peer) if peer.is_ipv6() => {
                "[::]:0".parse().map_err(|_| SocketError::InvalidAddress)?
            }
            Role::Connect(_) => "0.0.0.0:0".parse().map_err(|_| SocketError::InvalidAddress)?,
            Role::Listen(addr) => addr,
        };

        let socket = RudpSocket::bind(bind_addr)?;
        if let Some(size) = self.recv_buffer_size {
            if let Err(e) = socket.set_recv_buffer_size(size) {
                tracing::warn!("Could not set receive buffer to {} bytes: {}", size, e);
            }
        }

        match self.role {
            Role::Connect(peer) => {
                tracing::info!("Sender bound to {} for {}", socket.local_addr()?, peer)
            }
            Role::Listen(_) => tracing::info!("Receiver listening on {}", socket.local_addr()?),
        }

        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "peer address not known yet"))?;
        Ok(self.socket()?.send_to(datagram, peer)?)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (n, from) = self.socket()?.recv_from(buf)?;
        if let Role::Listen(_) = self.role {
            if self.peer != Some(from) {
                tracing::debug!("Peer address is now {}", from);
                self.peer = Some(from);
            }
        }
        Ok(n)
    }

    fn ready(&mut self, timeout: Duration) -> bool {
        match self.socket() {
            Ok(socket) => socket.wait_readable(timeout).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.socket = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_creation() {
        let socket = RudpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = socket.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[test]
    fn test_socket_buffer_sizes() {
        let socket = RudpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        socket.set_send_buffer_size(262144).unwrap();
        socket.set_recv_buffer_size(262144).unwrap();

        // May not match exactly due to OS limits
        assert!(socket.send_buffer_size().unwrap() > 0);
        assert!(socket.recv_buffer_size().unwrap() > 0);
    }

    #[test]
    fn test_wait_readable_times_out() {
        let socket = RudpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(!socket.wait_readable(Duration::ZERO).unwrap());
        assert!(!socket.wait_readable(Duration::from_millis(20)).unwrap());
    }

    #[test]
    fn test_connection_round_trip() {
        let mut receiver = UdpConnection::listen_on("127.0.0.1:0".parse().unwrap());
        receiver.open().unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let mut sender = UdpConnection::connect_to(receiver_addr);
        sender.open().unwrap();

        // Receiver cannot reply before it has heard from anyone
        assert!(receiver.send(b"early").is_err());

        sender.send(b"STREAM_START").unwrap();
        assert!(receiver.ready(Duration::from_secs(1)));

        let mut buf = [0u8; 64];
        let n = receiver.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"STREAM_START");
        assert_eq!(receiver.peer_addr(), sender.local_addr());

        receiver.send(&[0x04, 0x00, 0x02, 0x09]).unwrap();
        assert!(sender.ready(Duration::from_secs(1)));
        let n = sender.receive(&mut buf).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut receiver = UdpConnection::listen_on("127.0.0.1:0".parse().unwrap());
        receiver.open().unwrap();
        let first = receiver.local_addr().unwrap();
        receiver.open().unwrap();
        assert_eq!(receiver.local_addr().unwrap(), first);
    }

    #[test]
    fn test_receive_empty_would_block() {
        let mut receiver = UdpConnection::listen_on("127.0.0.1:0".parse().unwrap());
        receiver.open().unwrap();

        let mut buf = [0u8; 16];
        let err = receiver.receive(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_closed_connection_errors() {
        let mut sender = UdpConnection::connect_to("127.0.0.1:9".parse().unwrap());
        assert!(sender.send(b"x").is_err());
        assert!(!sender.ready(Duration::ZERO));
        sender.close().unwrap();
    }
}
