//! Packet Structures and Serialization
//!
//! Every datagram exchanged after the handshake starts with a fixed 9-byte
//! header (sequence number, advertised window, control flag, checksum), all
//! multi-byte fields in network byte order. DATA packets carry up to
//! [`PAYLOAD_SIZE`] bytes of payload; control packets are header only.

use crate::checksum::{self, compute_checksum};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use thiserror::Error;

/// Payload bytes carried by a full DATA packet
pub const PAYLOAD_SIZE: usize = 512;

/// Size of the packet header in bytes (4 + 2 + 1 + 2)
pub const HEADER_SIZE: usize = 9;

/// Byte offset of the checksum field within the header
pub const CHECKSUM_OFFSET: usize = 7;

/// Size of a full DATA packet on the wire
pub const DATA_PACKET_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

/// Size of a control packet on the wire
pub const CTRL_PACKET_SIZE: usize = HEADER_SIZE;

/// Control flag carried in byte 6 of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ControlFlag {
    /// Payload-carrying packet
    #[default]
    Data = 0,
    /// Cumulative acknowledgement: everything below `seq` was received
    Ack = 1,
    /// Negative acknowledgement: `seq` is missing
    Nack = 2,
    /// Sender has nothing more to send
    Fin = 3,
    /// Receiver acknowledges the FIN
    FinAck = 4,
}

impl ControlFlag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ControlFlag::Data),
            1 => Some(ControlFlag::Ack),
            2 => Some(ControlFlag::Nack),
            3 => Some(ControlFlag::Fin),
            4 => Some(ControlFlag::FinAck),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ControlFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlFlag::Data => "DATA",
            ControlFlag::Ack => "ACK",
            ControlFlag::Nack => "NACK",
            ControlFlag::Fin => "FIN",
            ControlFlag::FinAck => "FIN_ACK",
        };
        f.write_str(name)
    }
}

/// Fixed 9-byte packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHeader {
    /// Sequence number (DATA) or acknowledged/missing sequence (control)
    pub seq: u32,
    /// Advertised window size
    pub window_size: u16,
    /// Control flag
    pub flag: ControlFlag,
    /// Ones-complement checksum, computed with this field zeroed
    pub checksum: u16,
}

impl PacketHeader {
    /// Create a header with a zero checksum
    pub fn new(flag: ControlFlag, seq: u32, window_size: u16) -> Self {
        PacketHeader {
            seq,
            window_size,
            flag,
            checksum: 0,
        }
    }

    /// Parse header from bytes (network byte order)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::InsufficientData {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let seq = buf.get_u32();
        let window_size = buf.get_u16();
        let raw_flag = buf.get_u8();
        let checksum = buf.get_u16();

        let flag = ControlFlag::from_u8(raw_flag).ok_or(PacketError::InvalidControlFlag(raw_flag))?;

        Ok(PacketHeader {
            seq,
            window_size,
            flag,
            checksum,
        })
    }

    /// Read the raw sequence number without validating anything else.
    ///
    /// Used for bookkeeping on packets that already failed verification.
    pub fn peek_seq(bytes: &[u8]) -> Option<u32> {
        if bytes.len() < 4 {
            return None;
        }
        let mut buf = &bytes[..4];
        Some(buf.get_u32())
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u32(self.seq);
        buf.put_u16(self.window_size);
        buf.put_u8(self.flag.as_u8());
        buf.put_u16(self.checksum);
    }
}

/// Header plus a fixed-size payload buffer
///
/// Only the first `payload_len` bytes of the buffer are meaningful and
/// only those go on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet header
    pub header: PacketHeader,
    payload: [u8; PAYLOAD_SIZE],
    payload_len: usize,
}

impl Default for Packet {
    fn default() -> Self {
        Packet {
            header: PacketHeader::default(),
            payload: [0u8; PAYLOAD_SIZE],
            payload_len: 0,
        }
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("header", &self.header)
            .field("payload_len", &self.payload_len)
            .finish()
    }
}

impl Packet {
    /// Create an unsealed DATA packet
    pub fn data(seq: u32, window_size: u16, payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() > PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: payload.len(),
                max: PAYLOAD_SIZE,
            });
        }

        let mut packet = Packet {
            header: PacketHeader::new(ControlFlag::Data, seq, window_size),
            ..Packet::default()
        };
        packet.payload[..payload.len()].copy_from_slice(payload);
        packet.payload_len = payload.len();
        Ok(packet)
    }

    /// Create a sealed header-only control packet
    pub fn control(flag: ControlFlag, seq: u32, window_size: u16) -> Self {
        let mut packet = Packet {
            header: PacketHeader::new(flag, seq, window_size),
            ..Packet::default()
        };
        packet.seal();
        packet
    }

    /// Reset this packet to an empty DATA packet and fill its payload
    /// buffer through `fill`, which returns how many bytes it wrote.
    pub fn fill_data<F, E>(&mut self, seq: u32, window_size: u16, fill: F) -> Result<usize, E>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, E>,
    {
        self.header = PacketHeader::new(ControlFlag::Data, seq, window_size);
        let written = fill(&mut self.payload)?;
        self.payload_len = written.min(PAYLOAD_SIZE);
        Ok(self.payload_len)
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.header.seq
    }

    #[inline]
    pub fn flag(&self) -> ControlFlag {
        self.header.flag
    }

    #[inline]
    pub fn window_size(&self) -> u16 {
        self.header.window_size
    }

    /// The used part of the payload buffer
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total size of the packet on the wire
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Compute the checksum over header and used payload and store it
    pub fn seal(&mut self) {
        self.header.checksum = 0;
        let bytes = self.to_bytes();
        self.header.checksum = compute_checksum(&bytes);
    }

    /// Check the stored checksum against the packet contents
    pub fn verify(&self) -> bool {
        checksum::verify(&self.to_bytes())
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.to_bytes(&mut buf);
        buf.put_slice(self.payload());
        buf
    }

    /// Parse a packet from bytes.
    ///
    /// This is a structural parse only; callers verify the checksum first.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let header = PacketHeader::from_bytes(bytes)?;

        let body = &bytes[HEADER_SIZE..];
        if body.len() > PAYLOAD_SIZE {
            return Err(PacketError::PayloadTooLarge {
                size: body.len(),
                max: PAYLOAD_SIZE,
            });
        }

        let mut packet = Packet {
            header,
            ..Packet::default()
        };
        packet.payload[..body.len()].copy_from_slice(body);
        packet.payload_len = body.len();
        Ok(packet)
    }
}

/// Packet parsing and validation errors
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Invalid control flag: {0}")]
    InvalidControlFlag(u8),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_flag_values() {
        assert_eq!(ControlFlag::from_u8(0), Some(ControlFlag::Data));
        assert_eq!(ControlFlag::from_u8(4), Some(ControlFlag::FinAck));
        assert_eq!(ControlFlag::from_u8(5), None);
        assert_eq!(ControlFlag::Nack.as_u8(), 2);
        assert_eq!(ControlFlag::FinAck.to_string(), "FIN_ACK");
    }

    #[test]
    fn test_header_layout() {
        let header = PacketHeader {
            seq: 0x0102_0304,
            window_size: 0x0506,
            flag: ControlFlag::Nack,
            checksum: 0x0708,
        };
        let mut buf = BytesMut::new();
        header.to_bytes(&mut buf);

        assert_eq!(&buf[..], &[1, 2, 3, 4, 5, 6, 2, 7, 8]);
        assert_eq!(PacketHeader::from_bytes(&buf).unwrap(), header);
        assert_eq!(PacketHeader::peek_seq(&buf), Some(0x0102_0304));
    }

    #[test]
    fn test_header_rejects_short_input() {
        let err = PacketHeader::from_bytes(&[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            PacketError::InsufficientData {
                expected: HEADER_SIZE,
                actual: 8
            }
        ));
    }

    #[test]
    fn test_header_rejects_unknown_flag() {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[6] = 9;
        assert!(matches!(
            PacketHeader::from_bytes(&bytes),
            Err(PacketError::InvalidControlFlag(9))
        ));
    }

    #[test]
    fn test_data_packet_serialization() {
        let mut packet = Packet::data(42, 6666, b"hello").unwrap();
        packet.seal();
        let bytes = packet.to_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        assert!(checksum::verify(&bytes));

        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.seq(), 42);
        assert_eq!(decoded.window_size(), 6666);
        assert_eq!(decoded.flag(), ControlFlag::Data);
        assert_eq!(decoded.payload(), b"hello");
        assert!(decoded.verify());
    }

    #[test]
    fn test_control_packet_is_header_only_and_sealed() {
        let packet = Packet::control(ControlFlag::Ack, 10, 6666);
        let bytes = packet.to_bytes();

        assert_eq!(bytes.len(), CTRL_PACKET_SIZE);
        assert!(packet.verify());
        assert_ne!(packet.header.checksum, 0);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; PAYLOAD_SIZE + 1];
        assert!(matches!(
            Packet::data(0, 1, &payload),
            Err(PacketError::PayloadTooLarge { .. })
        ));

        let mut wire = vec![0u8; HEADER_SIZE];
        wire.extend_from_slice(&payload);
        assert!(Packet::from_bytes(&wire).is_err());
    }

    #[test]
    fn test_fill_data() {
        let mut packet = Packet::default();
        let written = packet
            .fill_data(7, 100, |buf| -> Result<usize, ()> {
                buf[..3].copy_from_slice(b"abc");
                Ok(3)
            })
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(packet.seq(), 7);
        assert_eq!(packet.payload(), b"abc");
        assert_eq!(packet.size(), HEADER_SIZE + 3);
    }

    #[test]
    fn test_seal_covers_payload() {
        let mut packet = Packet::data(1, 1, &[0xAA; PAYLOAD_SIZE]).unwrap();
        packet.seal();
        let mut bytes = packet.to_bytes();
        bytes[HEADER_SIZE + 100] ^= 0x01;
        assert!(!checksum::verify(&bytes));
    }
}
