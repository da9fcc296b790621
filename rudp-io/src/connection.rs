//! Network capability consumed by the protocol engines
//!
//! A connection moves whole datagrams. It gives no delivery or ordering
//! guarantees; the engines build those on top.

use std::io;
use std::time::Duration;

/// Datagram transport used by the sender and receiver engines
pub trait NetworkConnection {
    /// Prepare the transport (bind, resolve the peer, ...)
    fn open(&mut self) -> io::Result<()>;

    /// Send one datagram to the peer, returning the number of bytes sent
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize>;

    /// Receive one datagram into `buf`.
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing is available.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for a datagram to become available
    fn ready(&mut self, timeout: Duration) -> bool;

    /// Release the transport
    fn close(&mut self) -> io::Result<()>;
}

impl<N: NetworkConnection + ?Sized> NetworkConnection for Box<N> {
    fn open(&mut self) -> io::Result<()> {
        (**self).open()
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        (**self).send(datagram)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).receive(buf)
    }

    fn ready(&mut self, timeout: Duration) -> bool {
        (**self).ready(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Check whether an I/O error only means "nothing to read right now"
#[inline]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
