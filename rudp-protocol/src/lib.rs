//! rudp Protocol Core
//!
//! This crate implements the wire-level pieces of the rudp reliable streaming
//! protocol: the packet format, the ones-complement checksum, the
//! sequence-indexed sliding window, and the handshake negotiation codec.

pub mod checksum;
pub mod handshake;
pub mod packet;
pub mod window;

pub use checksum::{compute_checksum, verify};
pub use handshake::{HandshakeError, Negotiation, HANDSHAKE_TOKEN};
pub use packet::{
    ControlFlag, Packet, PacketError, PacketHeader, CTRL_PACKET_SIZE, DATA_PACKET_SIZE,
    HEADER_SIZE, PAYLOAD_SIZE,
};
pub use window::SlidingWindow;
