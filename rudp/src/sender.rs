//! Sender engine
//!
//! Frames bytes from a [`ByteSource`] into sequenced DATA packets and keeps
//! every unacknowledged packet in a sliding window until the receiver's
//! cumulative ACK passes it. Lost packets are recovered two ways: an explicit
//! NACK from the receiver, or a flat retransmission timeout.
//!
//! The engine is a single-threaded loop. Each pass fills the window, drains
//! pending control packets, then resends whatever has timed out.

use crate::config::EngineConfig;
use crate::data::ByteSource;
use crate::error::SenderError;
use crate::stats::{StatsSink, TransferStats};
use rudp_io::{is_transient, older_than, Deadline, NetworkConnection, Timer};
use rudp_protocol::{
    verify, ControlFlag, HandshakeError, Negotiation, Packet, PacketHeader, SlidingWindow,
    DATA_PACKET_SIZE, HANDSHAKE_TOKEN, HEADER_SIZE,
};
use std::thread;
use std::time::{Duration, Instant};

/// A packet in flight
#[derive(Debug, Clone, Default)]
pub struct PacketInfo {
    /// Sealed copy of what went on the wire
    pub packet: Packet,
    /// Set once the packet has been resent because of a NACK
    pub retried: bool,
    /// Last time the packet was transmitted
    pub last_sent: Option<Instant>,
}

/// Sender engine
pub struct Sender<N, S, R = TransferStats> {
    conn: N,
    source: S,
    stats: R,
    config: EngineConfig,
    window: SlidingWindow<PacketInfo>,
    /// Lowest unacknowledged sequence number
    base: u32,
    /// Next sequence number to assign
    next_seq: u32,
    /// One past the last DATA packet; valid once `exhausted`
    final_seq: u32,
    exhausted: bool,
    recv_buf: [u8; DATA_PACKET_SIZE],
}

impl<N: NetworkConnection, S: ByteSource> Sender<N, S> {
    /// Create a sender that counts statistics in a [`TransferStats`]
    pub fn new(conn: N, source: S, config: EngineConfig) -> Result<Self, SenderError> {
        Self::with_stats(conn, source, config, TransferStats::default())
    }
}

impl<N, S, R> Sender<N, S, R>
where
    N: NetworkConnection,
    S: ByteSource,
    R: StatsSink,
{
    /// Create a sender reporting into a custom statistics sink
    pub fn with_stats(
        conn: N,
        source: S,
        config: EngineConfig,
        stats: R,
    ) -> Result<Self, SenderError> {
        config.validate()?;
        let window = SlidingWindow::new(usize::from(config.window_size));

        Ok(Sender {
            conn,
            source,
            stats,
            config,
            window,
            base: 0,
            next_seq: 0,
            final_seq: 0,
            exhausted: false,
            recv_buf: [0u8; DATA_PACKET_SIZE],
        })
    }

    /// Open the connection, then handshake, stream and tear down
    pub fn run(&mut self) -> Result<(), SenderError> {
        self.conn.open()?;
        self.handshake()?;
        self.stream()?;
        self.teardown()?;
        Ok(())
    }

    /// Send the handshake token until the receiver answers with a matching
    /// negotiation.
    pub fn handshake(&mut self) -> Result<Negotiation, SenderError> {
        let deadline = Deadline::after(self.config.handshake_timeout);
        let mut retry = Timer::new(self.config.handshake_retry);

        tracing::info!("Sending handshake");
        transmit(&mut self.conn, HANDSHAKE_TOKEN);

        loop {
            if deadline.expired() {
                let limit = deadline.limit().unwrap_or_default();
                return Err(HandshakeError::Timeout(limit).into());
            }

            let wait = match deadline.remaining() {
                Some(left) => retry.time_until_expiration().min(left),
                None => retry.time_until_expiration(),
            };

            if self.conn.ready(wait) {
                match self.conn.receive(&mut self.recv_buf) {
                    Ok(n) if n == rudp_protocol::handshake::NEGOTIATION_SIZE => {
                        let peer = Negotiation::from_bytes(&self.recv_buf[..n])?;
                        self.config.negotiation.check(&peer)?;
                        tracing::info!(
                            "Handshake complete: buffer size {}, packet size {}",
                            peer.buffer_size,
                            peer.packet_size
                        );
                        return Ok(peer);
                    }
                    Ok(n) => tracing::debug!("Ignoring {}-byte datagram during handshake", n),
                    Err(e) if is_transient(&e) => {}
                    Err(e) => tracing::warn!("Receive failed during handshake: {}", e),
                }
            }

            if retry.try_fire() {
                tracing::debug!("No negotiation yet, resending handshake");
                transmit(&mut self.conn, HANDSHAKE_TOKEN);
            }
        }
    }

    /// Run the transfer loop until every packet is acknowledged
    pub fn stream(&mut self) -> Result<(), SenderError> {
        tracing::info!(
            "Streaming with window {} (max packets {})",
            self.config.window_size,
            self.config.max_packets
        );
        let started = Instant::now();

        while !self.step()? {
            if !self.config.loop_sleep.is_zero() {
                thread::sleep(self.config.loop_sleep);
            }
        }

        tracing::info!(
            "All {} packets acknowledged in {:?}",
            self.final_seq,
            started.elapsed()
        );
        Ok(())
    }

    /// One pass of the transfer loop. Returns `true` once the transfer is done.
    pub fn step(&mut self) -> Result<bool, SenderError> {
        self.fill_window()?;
        self.process_control()?;
        self.retransmit_expired();
        self.stats.report(false);
        Ok(self.is_complete())
    }

    /// Send FIN until the receiver answers or the attempts run out, then a
    /// final ACK. Returns the number of FINs sent.
    pub fn teardown(&mut self) -> Result<u32, SenderError> {
        let window_size = self.config.window_size;
        let fin = Packet::control(ControlFlag::Fin, self.final_seq, window_size).to_bytes();

        let mut attempts = 0;
        let mut acknowledged = false;
        while !acknowledged && attempts < self.config.fin_attempts {
            attempts += 1;
            tracing::debug!(
                "Sending FIN {} (attempt {}/{})",
                self.final_seq,
                attempts,
                self.config.fin_attempts
            );
            transmit(&mut self.conn, &fin);
            acknowledged = self.wait_for_fin_ack();
        }

        if acknowledged {
            tracing::info!("Receiver acknowledged FIN");
        } else {
            tracing::warn!("No FIN_ACK after {} attempts, closing anyway", attempts);
        }

        let ack = Packet::control(ControlFlag::Ack, self.final_seq, window_size).to_bytes();
        transmit(&mut self.conn, &ack);

        self.stats.report(true);
        self.window.clear();
        self.conn.close()?;
        Ok(attempts)
    }

    /// Lowest unacknowledged sequence number
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Next sequence number to be assigned
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Whether the source has run dry (or the packet limit was hit)
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn stats(&self) -> &R {
        &self.stats
    }

    pub fn connection(&self) -> &N {
        &self.conn
    }

    fn is_complete(&self) -> bool {
        self.exhausted && self.base == self.final_seq
    }

    fn mark_exhausted(&mut self) {
        self.exhausted = true;
        self.final_seq = self.next_seq;
        tracing::debug!("Source exhausted after {} packets", self.final_seq);
    }

    fn fill_window(&mut self) -> Result<(), SenderError> {
        let window_size = self.config.window_size;
        let limit = self.base.saturating_add(u32::from(window_size));

        while !self.exhausted && self.next_seq < limit {
            if self.next_seq == self.config.max_packets {
                self.mark_exhausted();
                break;
            }

            let seq = self.next_seq;
            let source = &mut self.source;
            let Some(info) = self.window.reserve(seq) else {
                break;
            };

            let written = info
                .packet
                .fill_data(seq, window_size, |buf| source.get_data(buf))
                .map_err(SenderError::Source)?;

            if written == 0 {
                self.window.erase(seq);
                self.mark_exhausted();
                break;
            }

            info.packet.seal();
            info.retried = false;
            info.last_sent = Some(Instant::now());
            let bytes = info.packet.to_bytes();

            transmit(&mut self.conn, &bytes);
            self.stats.record_packet(written);
            tracing::trace!("Sent DATA {} ({} bytes)", seq, written);
            self.next_seq += 1;
        }
        Ok(())
    }

    fn process_control(&mut self) -> Result<(), SenderError> {
        let mut wait = self.config.ack_wait;

        while self.conn.ready(wait) {
            wait = self.config.subsequent_ack_wait;

            let n = match self.conn.receive(&mut self.recv_buf) {
                Ok(n) => n,
                Err(e) if is_transient(&e) => continue,
                Err(e) => {
                    tracing::warn!("Receive failed: {}", e);
                    continue;
                }
            };

            let datagram = &self.recv_buf[..n];
            if n < HEADER_SIZE {
                self.stats.record_ignored();
                continue;
            }
            if !verify(datagram) {
                tracing::debug!("Dropping corrupted control packet");
                self.stats.record_corrupted();
                continue;
            }
            let header = match PacketHeader::from_bytes(datagram) {
                Ok(header) => header,
                Err(e) => {
                    tracing::debug!("Dropping unparseable packet: {}", e);
                    self.stats.record_ignored();
                    continue;
                }
            };

            match header.flag {
                ControlFlag::Ack => {
                    self.stats.record_ack(header.flag);
                    self.handle_ack(header.seq);
                }
                ControlFlag::Nack => {
                    self.stats.record_ack(header.flag);
                    self.handle_nack(header.seq)?;
                }
                other => {
                    tracing::debug!("Ignoring {} {} during transfer", other, header.seq);
                    self.stats.record_ignored();
                }
            }
        }
        Ok(())
    }

    fn handle_ack(&mut self, seq: u32) {
        if seq < self.base {
            tracing::trace!("Stale ACK {} (base {})", seq, self.base);
            self.stats.record_ignored();
            return;
        }
        if seq > self.next_seq {
            tracing::warn!("ACK {} beyond next sequence {}", seq, self.next_seq);
            self.stats.record_ignored();
            return;
        }

        if self.window.advance_to(seq) {
            tracing::debug!("ACK {} moves base from {}", seq, self.base);
            self.base = seq;
        } else {
            tracing::trace!("Duplicate ACK {}", seq);
            self.stats.record_ignored();
        }
    }

    fn handle_nack(&mut self, seq: u32) -> Result<(), SenderError> {
        if seq < self.base {
            tracing::trace!("Stale NACK {} (base {})", seq, self.base);
            self.stats.record_ignored();
            return Ok(());
        }

        let now = Instant::now();
        let Some(info) = self.window.get_mut(seq) else {
            tracing::error!(
                "NACK {} for a packet not in flight (base {}, next {})",
                seq,
                self.base,
                self.next_seq
            );
            return Err(SenderError::NackedPacketMissing {
                seq,
                base: self.base,
                next_seq: self.next_seq,
            });
        };

        if info.retried && !older_than(info.last_sent, self.config.nack_retry_interval, now) {
            tracing::trace!("NACK {} too soon after last resend", seq);
            self.stats.record_ignored();
            return Ok(());
        }

        info.retried = true;
        info.last_sent = Some(now);
        let bytes = info.packet.to_bytes();

        tracing::debug!("Resending DATA {} on NACK", seq);
        transmit(&mut self.conn, &bytes);
        self.stats.record_retransmit();
        Ok(())
    }

    fn retransmit_expired(&mut self) {
        let timeout = self.config.retransmit_timeout;
        let now = Instant::now();

        for seq in self.base..self.next_seq {
            let Some(info) = self.window.get_mut(seq) else {
                continue;
            };
            if !older_than(info.last_sent, timeout, now) {
                continue;
            }

            info.last_sent = Some(now);
            let bytes = info.packet.to_bytes();

            tracing::debug!("Resending DATA {} after timeout", seq);
            transmit(&mut self.conn, &bytes);
            self.stats.record_retransmit();
        }
    }

    /// Wait up to `fin_wait` for a FIN_ACK, ignoring anything else
    fn wait_for_fin_ack(&mut self) -> bool {
        let deadline = Instant::now() + self.config.fin_wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO || !self.conn.ready(remaining) {
                return false;
            }

            match self.conn.receive(&mut self.recv_buf) {
                Ok(n) => {
                    let datagram = &self.recv_buf[..n];
                    if n < HEADER_SIZE || !verify(datagram) {
                        continue;
                    }
                    if let Ok(header) = PacketHeader::from_bytes(datagram) {
                        if header.flag == ControlFlag::FinAck {
                            self.stats.record_ack(ControlFlag::FinAck);
                            return true;
                        }
                    }
                }
                Err(e) if is_transient(&e) => {}
                Err(e) => tracing::warn!("Receive failed during teardown: {}", e),
            }
        }
    }
}

/// Send a datagram, logging failures. Loss is recovered by the protocol.
pub(crate) fn transmit<N: NetworkConnection>(conn: &mut N, datagram: &[u8]) -> bool {
    match conn.send(datagram) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Send failed: {}", e);
            false
        }
    }
}
