//! Property-based tests for packet framing and the checksum
//!
//! These tests use proptest to generate random packets and check that any
//! single flipped bit is caught and that headers survive the wire.

use proptest::prelude::*;
use rudp_protocol::packet::CHECKSUM_OFFSET;
use rudp_protocol::{
    compute_checksum, verify, ControlFlag, Packet, PacketHeader, HEADER_SIZE, PAYLOAD_SIZE,
};

fn flag_strategy() -> impl Strategy<Value = ControlFlag> {
    prop_oneof![
        Just(ControlFlag::Data),
        Just(ControlFlag::Ack),
        Just(ControlFlag::Nack),
        Just(ControlFlag::Fin),
        Just(ControlFlag::FinAck),
    ]
}

fn data_packet_strategy() -> impl Strategy<Value = Packet> {
    (
        any::<u32>(),
        any::<u16>(),
        prop::collection::vec(any::<u8>(), 0..=PAYLOAD_SIZE),
    )
        .prop_map(|(seq, window, payload)| {
            let mut packet = Packet::data(seq, window, &payload).unwrap();
            packet.seal();
            packet
        })
}

proptest! {
    #[test]
    fn prop_sealed_packets_verify(packet in data_packet_strategy()) {
        prop_assert!(verify(&packet.to_bytes()));
        prop_assert!(packet.verify());
    }

    #[test]
    fn prop_single_bit_flip_detected(
        packet in data_packet_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut bytes = packet.to_bytes();
        let i = position.index(bytes.len());
        bytes[i] ^= 1 << bit;
        prop_assert!(!verify(&bytes), "flip at byte {} bit {} went unnoticed", i, bit);
    }

    #[test]
    fn prop_header_fields_survive_wire(
        flag in flag_strategy(),
        seq in any::<u32>(),
        window in any::<u16>(),
    ) {
        let packet = Packet::control(flag, seq, window);
        let bytes = packet.to_bytes();
        prop_assert_eq!(bytes.len(), HEADER_SIZE);

        let header = PacketHeader::from_bytes(&bytes).unwrap();
        prop_assert_eq!(header.flag, flag);
        prop_assert_eq!(header.seq, seq);
        prop_assert_eq!(header.window_size, window);
        prop_assert_eq!(PacketHeader::peek_seq(&bytes), Some(seq));
    }

    #[test]
    fn prop_checksum_field_is_excluded(
        packet in data_packet_strategy(),
        bogus in any::<u16>(),
    ) {
        let mut bytes = packet.to_bytes();
        let expected = packet.header.checksum;
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&bogus.to_be_bytes());
        prop_assert_eq!(verify(&bytes), bogus == expected);

        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].fill(0);
        prop_assert_eq!(compute_checksum(&bytes), expected);
    }

    #[test]
    fn prop_short_input_never_verifies(bytes in prop::collection::vec(any::<u8>(), 0..HEADER_SIZE)) {
        prop_assert!(!verify(&bytes));
        prop_assert!(PacketHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn prop_unknown_flags_rejected(raw in 5u8..=255, seq in any::<u32>()) {
        let mut bytes = Packet::control(ControlFlag::Ack, seq, 1).to_bytes();
        bytes[6] = raw;
        prop_assert!(PacketHeader::from_bytes(&bytes).is_err());
    }
}
