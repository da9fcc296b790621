//! Receiver engine
//!
//! Validates incoming DATA packets, buffers anything that arrives ahead of
//! the next expected sequence number, and hands payload to the byte sink
//! strictly in order. Gaps are reported with NACKs; progress is reported
//! with a cumulative ACK each time the delivered count crosses a multiple of
//! the sender's advertised window, and whenever a duplicate shows the sender
//! is still retransmitting.
//!
//! ACKs and NACKs are rate limited per sequence number through two timing
//! windows that slide in lockstep with the out-of-order store.

use crate::config::EngineConfig;
use crate::data::ByteSink;
use crate::error::ReceiverError;
use crate::sender::transmit;
use crate::stats::{StatsSink, TransferStats};
use rudp_io::{is_transient, older_than, Deadline, NetworkConnection};
use rudp_protocol::handshake::is_handshake;
use rudp_protocol::{
    verify, ControlFlag, HandshakeError, Packet, PacketHeader, SlidingWindow, DATA_PACKET_SIZE,
    HEADER_SIZE,
};
use std::time::{Duration, Instant};

/// Outcome of waiting for the sender's final ACK
enum FinWait {
    FinalAck,
    FinAgain,
    TimedOut,
}

/// Receiver engine
pub struct Receiver<N, K, R = TransferStats> {
    conn: N,
    sink: K,
    stats: R,
    config: EngineConfig,
    /// Out-of-order packets, based at `expected_seq`
    window: SlidingWindow<Packet>,
    /// Last time an ACK carrying a given sequence number was sent
    ack_times: SlidingWindow<Option<Instant>>,
    /// Last time a NACK for a given sequence number was sent
    nack_times: SlidingWindow<Option<Instant>>,
    expected_seq: u32,
    /// Window size advertised by the sender's DATA packets
    peer_window: u16,
    finished: bool,
    recv_buf: [u8; DATA_PACKET_SIZE],
}

impl<N: NetworkConnection, K: ByteSink> Receiver<N, K> {
    /// Create a receiver that counts statistics in a [`TransferStats`]
    pub fn new(conn: N, sink: K, config: EngineConfig) -> Result<Self, ReceiverError> {
        Self::with_stats(conn, sink, config, TransferStats::default())
    }
}

impl<N, K, R> Receiver<N, K, R>
where
    N: NetworkConnection,
    K: ByteSink,
    R: StatsSink,
{
    /// Create a receiver reporting into a custom statistics sink
    pub fn with_stats(
        conn: N,
        sink: K,
        config: EngineConfig,
        stats: R,
    ) -> Result<Self, ReceiverError> {
        config.validate()?;
        let capacity = usize::from(config.window_size);

        Ok(Receiver {
            conn,
            sink,
            stats,
            peer_window: config.window_size,
            config,
            window: SlidingWindow::new(capacity),
            ack_times: SlidingWindow::new(capacity),
            nack_times: SlidingWindow::new(capacity),
            expected_seq: 0,
            finished: false,
            recv_buf: [0u8; DATA_PACKET_SIZE],
        })
    }

    /// Open the connection, then handshake, receive and tear down.
    ///
    /// Teardown runs even when receiving fails.
    pub fn run(&mut self) -> Result<(), ReceiverError> {
        self.conn.open()?;
        self.handshake()?;
        let result = self.receive();
        self.teardown()?;
        result
    }

    /// Wait for the handshake token and answer with our negotiation
    pub fn handshake(&mut self) -> Result<(), ReceiverError> {
        let deadline = Deadline::after(self.config.handshake_timeout);
        tracing::info!("Waiting for handshake");

        loop {
            if deadline.expired() {
                let limit = deadline.limit().unwrap_or_default();
                return Err(HandshakeError::Timeout(limit).into());
            }
            if !self.conn.ready(self.config.poll_interval) {
                continue;
            }

            match self.conn.receive(&mut self.recv_buf) {
                Ok(n) if is_handshake(&self.recv_buf[..n]) => {
                    self.send_negotiation();
                    tracing::info!("Handshake received, negotiation sent");
                    return Ok(());
                }
                Ok(n) => tracing::debug!("Ignoring {}-byte datagram before handshake", n),
                Err(e) if is_transient(&e) => {}
                Err(e) => tracing::warn!("Receive failed during handshake: {}", e),
            }
        }
    }

    /// Process datagrams until the sender's FIN has been answered
    pub fn receive(&mut self) -> Result<(), ReceiverError> {
        let mut idle = Deadline::after(self.config.idle_timeout);

        while !self.finished {
            if idle.expired() {
                let limit = idle.limit().unwrap_or_default();
                tracing::warn!("No traffic for {:?}, giving up", limit);
                return Err(ReceiverError::IdleTimeout(limit));
            }

            if self.poll_once()? {
                idle.extend();
            }
            self.stats.report(false);
        }
        Ok(())
    }

    /// Wait up to one poll interval and handle at most one datagram.
    /// Returns `true` if a datagram was read.
    pub fn poll_once(&mut self) -> Result<bool, ReceiverError> {
        if !self.conn.ready(self.config.poll_interval) {
            return Ok(false);
        }

        match self.conn.receive(&mut self.recv_buf) {
            Ok(n) => {
                self.handle_datagram(n)?;
                Ok(true)
            }
            Err(e) if is_transient(&e) => Ok(false),
            Err(e) => {
                tracing::warn!("Receive failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Release buffers, flush the sink and close the connection
    pub fn teardown(&mut self) -> Result<(), ReceiverError> {
        self.sink.flush().map_err(ReceiverError::Sink)?;
        self.window.clear();
        self.ack_times.clear();
        self.nack_times.clear();
        self.stats.report(true);
        self.conn.close()?;
        tracing::info!("Receiver closed after {} packets", self.expected_seq);
        Ok(())
    }

    /// Next sequence number to be delivered
    pub fn expected_seq(&self) -> u32 {
        self.expected_seq
    }

    /// Whether the sender's FIN has been handled
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> &R {
        &self.stats
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn connection(&self) -> &N {
        &self.conn
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    fn handle_datagram(&mut self, n: usize) -> Result<(), ReceiverError> {
        let datagram = &self.recv_buf[..n];

        if is_handshake(datagram) {
            if self.expected_seq == 0 {
                tracing::debug!("Handshake repeated, resending negotiation");
                self.send_negotiation();
            } else {
                self.stats.record_ignored();
            }
            return Ok(());
        }

        if n < HEADER_SIZE {
            self.stats.record_ignored();
            return Ok(());
        }

        if !verify(datagram) {
            self.stats.record_corrupted();
            if let Some(seq) = PacketHeader::peek_seq(datagram) {
                tracing::debug!("Dropping corrupted packet claiming seq {}", seq);
                // Let the gap be NACKed again without waiting for the dedup interval
                self.nack_times.erase(seq);
            }
            return Ok(());
        }

        let packet = match Packet::from_bytes(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!("Dropping unparseable packet: {}", e);
                self.stats.record_ignored();
                return Ok(());
            }
        };

        match packet.flag() {
            ControlFlag::Data => self.handle_data(packet),
            ControlFlag::Fin => {
                self.handle_fin(packet.seq());
                Ok(())
            }
            other => {
                tracing::debug!("Ignoring {} {}", other, packet.seq());
                self.stats.record_ignored();
                Ok(())
            }
        }
    }

    fn handle_data(&mut self, packet: Packet) -> Result<(), ReceiverError> {
        let seq = packet.seq();
        if packet.window_size() > 0 {
            self.peer_window = packet.window_size();
        }

        if seq == self.expected_seq {
            let before = self.expected_seq;
            self.deliver(packet.payload())?;
            self.expected_seq += 1;
            self.drain_buffered()?;
            self.advance_windows();
            self.maybe_cumulative_ack(before);
        } else if seq > self.expected_seq {
            self.buffer(seq, packet);
            self.nack_gaps(seq);
        } else {
            tracing::trace!("Duplicate DATA {} (expected {})", seq, self.expected_seq);
            self.stats.record_ignored();
            self.echo_ack();
        }
        Ok(())
    }

    fn deliver(&mut self, payload: &[u8]) -> Result<(), ReceiverError> {
        self.sink
            .process_data(payload)
            .map_err(ReceiverError::Sink)?;
        self.stats.record_packet(payload.len());
        Ok(())
    }

    /// Deliver buffered successors of `expected_seq`
    fn drain_buffered(&mut self) -> Result<(), ReceiverError> {
        while let Some(next) = self.window.get(self.expected_seq) {
            self.sink
                .process_data(next.payload())
                .map_err(ReceiverError::Sink)?;
            self.stats.record_packet(next.payload_len());
            self.window.erase(self.expected_seq);
            self.expected_seq += 1;
        }
        Ok(())
    }

    fn advance_windows(&mut self) {
        let seq = self.expected_seq;
        self.window.advance_to(seq);
        self.ack_times.advance_to(seq);
        self.nack_times.advance_to(seq);
        debug_assert!(self.window.in_bounds(seq));
        debug_assert_eq!(self.window.base_seq(), self.ack_times.base_seq());
        debug_assert_eq!(self.window.base_seq(), self.nack_times.base_seq());
    }

    fn buffer(&mut self, seq: u32, packet: Packet) {
        if self.window.contains(seq) {
            tracing::trace!("DATA {} already buffered", seq);
            self.stats.record_ignored();
            return;
        }
        match self.window.reserve(seq) {
            Some(slot) => *slot = packet,
            None => {
                tracing::debug!("DATA {} outside receive window", seq);
                self.stats.record_ignored();
            }
        }
    }

    /// NACK every missing sequence number between `expected_seq` and `seq`
    fn nack_gaps(&mut self, seq: u32) {
        let now = Instant::now();
        let dedup = self.config.nack_dedup_interval;
        let capacity = self.window.capacity() as u32;
        let limit = seq.min(self.expected_seq.saturating_add(capacity));

        for missing in self.expected_seq..limit {
            if self.window.contains(missing) {
                continue;
            }
            let last = self.nack_times.get(missing).copied().flatten();
            if last.is_some() && !older_than(last, dedup, now) {
                continue;
            }
            if let Some(stamp) = self.nack_times.reserve(missing) {
                *stamp = Some(now);
            }
            tracing::debug!("NACK {}", missing);
            self.send_control(ControlFlag::Nack, missing);
        }
    }

    /// Send a cumulative ACK when delivery crosses a multiple of the
    /// sender's window
    fn maybe_cumulative_ack(&mut self, before: u32) {
        let window = u32::from(self.peer_window.max(1));
        if before / window < self.expected_seq / window {
            tracing::debug!("Cumulative ACK {}", self.expected_seq);
            self.stamp_ack(Instant::now());
            self.send_control(ControlFlag::Ack, self.expected_seq);
        }
    }

    /// Re-ACK `expected_seq` after a duplicate, at most once per dedup interval
    fn echo_ack(&mut self) {
        let now = Instant::now();
        let last = self.ack_times.get(self.expected_seq).copied().flatten();
        if last.is_some() && !older_than(last, self.config.ack_dedup_interval, now) {
            return;
        }
        tracing::debug!("ACK {} for duplicate", self.expected_seq);
        self.stamp_ack(now);
        self.send_control(ControlFlag::Ack, self.expected_seq);
    }

    fn stamp_ack(&mut self, now: Instant) {
        if let Some(stamp) = self.ack_times.reserve(self.expected_seq) {
            *stamp = Some(now);
        }
    }

    fn handle_fin(&mut self, seq: u32) {
        if seq != self.expected_seq {
            tracing::warn!(
                "FIN {} after {} delivered packets",
                seq,
                self.expected_seq
            );
        }
        tracing::info!("FIN received, {} packets delivered", self.expected_seq);
        self.stats.record_ack(ControlFlag::Fin);

        let mut attempts = 0;
        while attempts < self.config.fin_attempts {
            attempts += 1;
            self.send_control(ControlFlag::FinAck, seq);
            match self.wait_for_final_ack() {
                FinWait::FinalAck => {
                    tracing::debug!("Final ACK received");
                    break;
                }
                FinWait::FinAgain => tracing::debug!("FIN repeated, resending FIN_ACK"),
                FinWait::TimedOut => {
                    tracing::debug!("No final ACK (attempt {}/{})", attempts, self.config.fin_attempts)
                }
            }
        }
        self.finished = true;
    }

    fn wait_for_final_ack(&mut self) -> FinWait {
        let deadline = Instant::now() + self.config.fin_wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::ZERO || !self.conn.ready(remaining) {
                return FinWait::TimedOut;
            }

            let n = match self.conn.receive(&mut self.recv_buf) {
                Ok(n) => n,
                Err(e) => {
                    if !is_transient(&e) {
                        tracing::warn!("Receive failed during teardown: {}", e);
                    }
                    continue;
                }
            };

            let datagram = &self.recv_buf[..n];
            if n < HEADER_SIZE || !verify(datagram) {
                continue;
            }
            match PacketHeader::from_bytes(datagram).map(|h| h.flag) {
                Ok(ControlFlag::Ack) => return FinWait::FinalAck,
                Ok(ControlFlag::Fin) => return FinWait::FinAgain,
                _ => {}
            }
        }
    }

    fn send_negotiation(&mut self) {
        let reply = self.config.negotiation.to_bytes();
        transmit(&mut self.conn, &reply);
    }

    fn send_control(&mut self, flag: ControlFlag, seq: u32) {
        let packet = Packet::control(flag, seq, self.config.window_size);
        if transmit(&mut self.conn, &packet.to_bytes()) {
            self.stats.record_ack(flag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rudp_io::MemoryLink;
    use rudp_protocol::Negotiation;

    fn test_config(window_size: u16) -> EngineConfig {
        EngineConfig {
            window_size,
            poll_interval: Duration::ZERO,
            fin_wait: Duration::from_millis(5),
            ack_dedup_interval: Duration::from_secs(60),
            nack_dedup_interval: Duration::from_secs(60),
            ..EngineConfig::default()
        }
    }

    fn receiver(window_size: u16) -> (Receiver<MemoryLink, Vec<u8>>, MemoryLink) {
        let (link, peer) = MemoryLink::pair();
        let receiver = Receiver::new(link, Vec::new(), test_config(window_size)).unwrap();
        (receiver, peer)
    }

    fn data(seq: u32, window: u16) -> Vec<u8> {
        let mut packet = Packet::data(seq, window, &[b'a' + (seq % 26) as u8; 4]).unwrap();
        packet.seal();
        packet.to_bytes().to_vec()
    }

    /// Feed datagrams and process everything queued
    fn feed(receiver: &mut Receiver<MemoryLink, Vec<u8>>, peer: &mut MemoryLink, datagrams: &[Vec<u8>]) {
        for datagram in datagrams {
            peer.send(datagram).unwrap();
        }
        while receiver.poll_once().unwrap() {}
    }

    fn replies(peer: &mut MemoryLink) -> Vec<(ControlFlag, u32)> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = peer.receive(&mut buf) {
            let packet = Packet::from_bytes(&buf[..n]).unwrap();
            assert!(packet.verify());
            out.push((packet.flag(), packet.seq()));
        }
        out
    }

    fn expected_payload(seqs: std::ops::Range<u32>) -> Vec<u8> {
        seqs.flat_map(|seq| [b'a' + (seq % 26) as u8; 4]).collect()
    }

    #[test]
    fn test_handshake_replies_with_negotiation() {
        let (mut receiver, mut peer) = receiver(16);
        peer.send(b"hello").unwrap();
        peer.send(b"STREAM_START").unwrap();

        receiver.handshake().unwrap();

        let mut buf = [0u8; 16];
        let n = peer.receive(&mut buf).unwrap();
        assert_eq!(Negotiation::from_bytes(&buf[..n]).unwrap(), Negotiation::default());
        assert!(peer.receive(&mut buf).is_err());
    }

    #[test]
    fn test_handshake_timeout() {
        let (link, _peer) = MemoryLink::pair();
        let config = EngineConfig {
            handshake_timeout: Some(Duration::from_millis(10)),
            poll_interval: Duration::from_millis(1),
            ..test_config(4)
        };
        let mut receiver = Receiver::new(link, Vec::new(), config).unwrap();
        assert!(matches!(
            receiver.handshake(),
            Err(ReceiverError::Handshake(HandshakeError::Timeout(_)))
        ));
    }

    #[test]
    fn test_repeated_handshake_answered_before_data() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[b"STREAM_START".to_vec()]);
        let mut buf = [0u8; 16];
        assert_eq!(peer.receive(&mut buf).unwrap(), 4);

        feed(&mut receiver, &mut peer, &[data(0, 16), b"STREAM_START".to_vec()]);
        assert!(peer.receive(&mut buf).is_err());
        assert_eq!(receiver.stats().ignored, 1);
    }

    #[test]
    fn test_in_order_delivery() {
        let (mut receiver, mut peer) = receiver(16);
        let packets: Vec<_> = (0..5).map(|seq| data(seq, 16)).collect();
        feed(&mut receiver, &mut peer, &packets);

        assert_eq!(receiver.expected_seq(), 5);
        assert_eq!(receiver.sink(), &expected_payload(0..5));
        assert!(replies(&mut peer).is_empty());
    }

    #[test]
    fn test_reorder_is_buffered_and_nacked() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(0, 16), data(3, 16), data(4, 16)]);

        assert_eq!(receiver.expected_seq(), 1);
        assert_eq!(receiver.sink(), &expected_payload(0..1));
        // Gap 1..3 NACKed once; the second out-of-order packet is deduped
        assert_eq!(
            replies(&mut peer),
            vec![(ControlFlag::Nack, 1), (ControlFlag::Nack, 2)]
        );

        feed(&mut receiver, &mut peer, &[data(2, 16), data(1, 16)]);
        assert_eq!(receiver.expected_seq(), 5);
        assert_eq!(receiver.sink(), &expected_payload(0..5));
    }

    #[test]
    fn test_duplicate_not_redelivered_and_acked_once() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(0, 16), data(1, 16)]);
        feed(&mut receiver, &mut peer, &[data(0, 16), data(1, 16), data(0, 16)]);

        assert_eq!(receiver.sink(), &expected_payload(0..2));
        assert_eq!(replies(&mut peer), vec![(ControlFlag::Ack, 2)]);
        assert_eq!(receiver.stats().packets, 2);
    }

    #[test]
    fn test_duplicate_out_of_order_buffered_once() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(2, 16), data(2, 16)]);
        feed(&mut receiver, &mut peer, &[data(0, 16), data(1, 16)]);

        assert_eq!(receiver.sink(), &expected_payload(0..3));
        assert_eq!(receiver.stats().packets, 3);
    }

    #[test]
    fn test_cumulative_ack_on_window_boundary() {
        let (mut receiver, mut peer) = receiver(16);
        let packets: Vec<_> = (0..9).map(|seq| data(seq, 4)).collect();
        feed(&mut receiver, &mut peer, &packets);

        assert_eq!(
            replies(&mut peer),
            vec![(ControlFlag::Ack, 4), (ControlFlag::Ack, 8)]
        );
    }

    #[test]
    fn test_drain_crossing_boundary_acks_once() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(1, 4), data(2, 4), data(3, 4), data(4, 4)]);
        replies(&mut peer);

        feed(&mut receiver, &mut peer, &[data(0, 4)]);
        assert_eq!(receiver.expected_seq(), 5);
        assert_eq!(replies(&mut peer), vec![(ControlFlag::Ack, 5)]);
    }

    #[test]
    fn test_out_of_window_dropped() {
        let (mut receiver, mut peer) = receiver(4);
        feed(&mut receiver, &mut peer, &[data(10, 4)]);

        assert_eq!(receiver.expected_seq(), 0);
        assert_eq!(receiver.stats().ignored, 1);
        // NACKs are capped at the window
        let nacks = replies(&mut peer);
        assert_eq!(
            nacks,
            (0..4).map(|seq| (ControlFlag::Nack, seq)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_corruption_resets_nack_timer() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(1, 16)]);
        assert_eq!(replies(&mut peer), vec![(ControlFlag::Nack, 0)]);

        // Same gap again: deduped
        feed(&mut receiver, &mut peer, &[data(2, 16)]);
        assert!(replies(&mut peer).is_empty());

        let mut corrupted = data(0, 16);
        corrupted[HEADER_SIZE + 1] ^= 0b1000;
        feed(&mut receiver, &mut peer, &[corrupted, data(3, 16)]);

        assert_eq!(receiver.stats().corrupted, 1);
        assert_eq!(replies(&mut peer), vec![(ControlFlag::Nack, 0)]);
        assert!(receiver.sink().is_empty());
    }

    #[test]
    fn test_short_datagram_ignored() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[vec![0u8; 5]]);
        assert_eq!(receiver.stats().ignored, 1);
        assert_eq!(receiver.expected_seq(), 0);
    }

    #[test]
    fn test_fin_answered_and_finishes() {
        let (mut receiver, mut peer) = receiver(16);
        feed(&mut receiver, &mut peer, &[data(0, 16)]);

        peer.send(&Packet::control(ControlFlag::Fin, 1, 16).to_bytes()).unwrap();
        peer.send(&Packet::control(ControlFlag::Ack, 1, 16).to_bytes()).unwrap();
        receiver.receive().unwrap();

        assert!(receiver.is_finished());
        assert_eq!(replies(&mut peer), vec![(ControlFlag::FinAck, 1)]);
    }

    #[test]
    fn test_fin_ack_attempts_bounded() {
        let (mut receiver, mut peer) = receiver(16);
        peer.send(&Packet::control(ControlFlag::Fin, 0, 16).to_bytes()).unwrap();
        receiver.receive().unwrap();

        let fin_acks = replies(&mut peer);
        assert_eq!(fin_acks.len(), 5);
        assert!(fin_acks.iter().all(|r| *r == (ControlFlag::FinAck, 0)));
    }

    #[test]
    fn test_idle_timeout() {
        let (link, _peer) = MemoryLink::pair();
        let config = EngineConfig {
            idle_timeout: Some(Duration::from_millis(10)),
            poll_interval: Duration::from_millis(1),
            ..test_config(4)
        };
        let mut receiver = Receiver::new(link, Vec::new(), config).unwrap();
        assert!(matches!(
            receiver.receive(),
            Err(ReceiverError::IdleTimeout(_))
        ));
    }

    #[test]
    fn test_sink_error_is_fatal() {
        struct Broken;
        impl ByteSink for Broken {
            fn process_data(&mut self, _data: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        let (link, mut peer) = MemoryLink::pair();
        let mut receiver = Receiver::new(link, Broken, test_config(4)).unwrap();
        peer.send(&data(0, 4)).unwrap();
        assert!(matches!(receiver.poll_once(), Err(ReceiverError::Sink(_))));
    }
}
