//! Connection handshake
//!
//! The sender opens a stream by sending [`HANDSHAKE_TOKEN`] until the receiver
//! answers with a 4-byte [`Negotiation`]: buffer size and packet size, both
//! 16-bit values in network byte order. The sender refuses to stream if the
//! receiver's values disagree with its own.

use crate::packet::DATA_PACKET_SIZE;
use bytes::{Buf, BufMut, BytesMut};
use std::time::Duration;
use thiserror::Error;

/// Literal token that starts a stream
pub const HANDSHAKE_TOKEN: &[u8] = b"STREAM_START";

/// Size of the negotiation reply in bytes
pub const NEGOTIATION_SIZE: usize = 4;

/// Buffer size both ends are compiled to agree on
pub const DEFAULT_BUFFER_SIZE: u16 = 1024;

/// Handshake errors
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Invalid negotiation packet: expected 4 bytes, got {0}")]
    InvalidNegotiation(usize),

    #[error("Negotiated {field} mismatch: expected {expected}, peer sent {actual}")]
    Mismatch {
        field: &'static str,
        expected: u16,
        actual: u16,
    },

    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Negotiation reply sent by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Negotiated buffer size
    pub buffer_size: u16,
    /// Negotiated packet size (header + full payload)
    pub packet_size: u16,
}

impl Default for Negotiation {
    fn default() -> Self {
        Negotiation {
            buffer_size: DEFAULT_BUFFER_SIZE,
            packet_size: DATA_PACKET_SIZE as u16,
        }
    }
}

impl Negotiation {
    /// Serialize to the 4-byte wire form
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(NEGOTIATION_SIZE);
        buf.put_u16(self.buffer_size);
        buf.put_u16(self.packet_size);
        buf
    }

    /// Parse the 4-byte wire form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeError> {
        if bytes.len() != NEGOTIATION_SIZE {
            return Err(HandshakeError::InvalidNegotiation(bytes.len()));
        }

        let mut buf = bytes;
        Ok(Negotiation {
            buffer_size: buf.get_u16(),
            packet_size: buf.get_u16(),
        })
    }

    /// Check a peer's negotiation against ours
    pub fn check(&self, peer: &Negotiation) -> Result<(), HandshakeError> {
        if peer.buffer_size != self.buffer_size {
            return Err(HandshakeError::Mismatch {
                field: "buffer size",
                expected: self.buffer_size,
                actual: peer.buffer_size,
            });
        }
        if peer.packet_size != self.packet_size {
            return Err(HandshakeError::Mismatch {
                field: "packet size",
                expected: self.packet_size,
                actual: peer.packet_size,
            });
        }
        Ok(())
    }
}

/// Check whether a datagram is the handshake token
#[inline]
pub fn is_handshake(datagram: &[u8]) -> bool {
    datagram == HANDSHAKE_TOKEN
}
