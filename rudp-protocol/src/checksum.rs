//! Internet-style ones-complement checksum
//!
//! Bytes are summed as 16-bit big-endian words with end-around carry; the
//! result is the ones complement of the folded sum. An odd trailing byte is
//! summed as a word with that byte in the high position.

use crate::packet::{CHECKSUM_OFFSET, HEADER_SIZE};
use std::ops::Range;

const CHECKSUM_FIELD: Range<usize> = CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2;

/// Compute the checksum of `bytes`
pub fn compute_checksum(bytes: &[u8]) -> u16 {
    ones_complement(bytes.iter().copied())
}

/// Verify a received datagram.
///
/// The checksum is recomputed with the checksum field read as zero and
/// compared with the stored big-endian value. Datagrams shorter than a
/// header never verify.
pub fn verify(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE {
        return false;
    }

    let stored = u16::from_be_bytes([bytes[CHECKSUM_OFFSET], bytes[CHECKSUM_OFFSET + 1]]);
    let zeroed = bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM_FIELD.contains(&i) { 0 } else { b });

    ones_complement(zeroed) == stored
}

fn ones_complement<I: Iterator<Item = u8>>(mut bytes: I) -> u16 {
    let mut sum: u64 = 0;
    while let Some(hi) = bytes.next() {
        let lo = bytes.next().unwrap_or(0);
        sum += u64::from(u16::from_be_bytes([hi, lo]));
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
