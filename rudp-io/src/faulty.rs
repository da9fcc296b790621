//! Fault-injecting connection wrapper
//!
//! Simulates a noisy channel by flipping one bit in a configurable fraction
//! of received datagrams. The bit lands just past the header so DATA
//! payloads are hit first; header-only datagrams get the flip in their last
//! byte.

use crate::connection::NetworkConnection;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rudp_protocol::HEADER_SIZE;
use std::io;
use std::time::Duration;

/// Byte offset that gets corrupted, clamped to the datagram length
const FLIP_OFFSET: usize = HEADER_SIZE + 1;

/// Bit mask applied at [`FLIP_OFFSET`]
const FLIP_MASK: u8 = 0b0000_1000;

/// Wraps a connection and corrupts some of what it receives
pub struct FaultyConnection<N> {
    inner: N,
    error_rate: f32,
    data_only: bool,
    rng: StdRng,
    flipped: u64,
}

impl<N: NetworkConnection> FaultyConnection<N> {
    /// Corrupt a proportion `error_rate` (0.0..=1.0) of received datagrams.
    ///
    /// With `data_only`, datagrams no longer than a header are left alone.
    /// A `seed` makes the fault pattern reproducible.
    pub fn new(inner: N, error_rate: f32, data_only: bool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        FaultyConnection {
            inner,
            error_rate: error_rate.clamp(0.0, 1.0),
            data_only,
            rng,
            flipped: 0,
        }
    }

    /// Number of datagrams corrupted so far
    pub fn flipped(&self) -> u64 {
        self.flipped
    }

    pub fn inner(&self) -> &N {
        &self.inner
    }

    pub fn into_inner(self) -> N {
        self.inner
    }
}

impl<N: NetworkConnection> NetworkConnection for FaultyConnection<N> {
    fn open(&mut self) -> io::Result<()> {
        self.inner.open()
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        self.inner.send(datagram)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.receive(buf)?;
        if n == 0 || (self.data_only && n <= HEADER_SIZE) {
            return Ok(n);
        }

        if self.rng.gen::<f32>() < self.error_rate {
            let offset = FLIP_OFFSET.min(n - 1);
            buf[offset] ^= FLIP_MASK;
            self.flipped += 1;
            tracing::trace!("Flipped bit at offset {} of {}-byte datagram", offset, n);
        }
        Ok(n)
    }

    fn ready(&mut self, timeout: Duration) -> bool {
        self.inner.ready(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}
