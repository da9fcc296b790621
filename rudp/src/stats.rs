//! Transfer statistics
//!
//! Engines push events into a [`StatsSink`]; what happens to them (plain
//! counting, periodic throughput lines, ...) is up to the sink.

use rudp_protocol::ControlFlag;

/// Receives statistics events from an engine
pub trait StatsSink {
    /// A DATA packet carrying `bytes` of payload was sent (sender) or
    /// delivered to the byte sink (receiver)
    fn record_packet(&mut self, bytes: usize);

    /// A control packet was received (sender) or sent (receiver)
    fn record_ack(&mut self, flag: ControlFlag);

    /// A datagram failed checksum verification
    fn record_corrupted(&mut self);

    /// A datagram was valid but had no effect
    fn record_ignored(&mut self);

    /// A DATA packet was sent again
    fn record_retransmit(&mut self) {}

    /// Publish the current numbers; `force` bypasses any reporting interval
    fn report(&mut self, force: bool);
}

/// Plain counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub packets: u64,
    pub bytes: u64,
    pub retransmits: u64,
    pub acks: u64,
    pub nacks: u64,
    pub fins: u64,
    pub fin_acks: u64,
    pub corrupted: u64,
    pub ignored: u64,
}

impl StatsSink for TransferStats {
    fn record_packet(&mut self, bytes: usize) {
        self.packets += 1;
        self.bytes += bytes as u64;
    }

    fn record_ack(&mut self, flag: ControlFlag) {
        match flag {
            ControlFlag::Ack => self.acks += 1,
            ControlFlag::Nack => self.nacks += 1,
            ControlFlag::Fin => self.fins += 1,
            ControlFlag::FinAck => self.fin_acks += 1,
            ControlFlag::Data => {}
        }
    }

    fn record_corrupted(&mut self) {
        self.corrupted += 1;
    }

    fn record_ignored(&mut self) {
        self.ignored += 1;
    }

    fn record_retransmit(&mut self) {
        self.retransmits += 1;
    }

    fn report(&mut self, force: bool) {
        if force {
            tracing::info!(
                packets = self.packets,
                bytes = self.bytes,
                retransmits = self.retransmits,
                acks = self.acks,
                nacks = self.nacks,
                corrupted = self.corrupted,
                ignored = self.ignored,
                "Transfer statistics"
            );
        }
    }
}

impl<S: StatsSink + ?Sized> StatsSink for Box<S> {
    fn record_packet(&mut self, bytes: usize) {
        (**self).record_packet(bytes)
    }

    fn record_ack(&mut self, flag: ControlFlag) {
        (**self).record_ack(flag)
    }

    fn record_corrupted(&mut self) {
        (**self).record_corrupted()
    }

    fn record_ignored(&mut self) {
        (**self).record_ignored()
    }

    fn record_retransmit(&mut self) {
        (**self).record_retransmit()
    }

    fn report(&mut self, force: bool) {
        (**self).report(force)
    }
}
