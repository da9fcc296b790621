//! Statistics display and formatting

use rudp::{StatsSink, TransferStats};
use rudp_io::Timer;
use rudp_protocol::ControlFlag;
use std::time::{Duration, Instant};

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Format duration in human-readable form
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Bits per second for `bytes` moved over `elapsed`
pub fn throughput_bps(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0;
    }
    (bytes as f64 * 8.0 / secs) as u64
}

/// Statistics sink that counts like [`TransferStats`] and, when enabled,
/// prints a throughput line once per interval
pub struct ThroughputReporter {
    counters: TransferStats,
    enabled: bool,
    label: &'static str,
    timer: Timer,
    started: Instant,
    last_bytes: u64,
    last_report: Instant,
}

impl ThroughputReporter {
    /// `label` names the packet counter ("sent" or "received")
    pub fn new(enabled: bool, interval: Duration, label: &'static str) -> Self {
        let now = Instant::now();
        ThroughputReporter {
            counters: TransferStats::default(),
            enabled,
            label,
            timer: Timer::new(interval),
            started: now,
            last_bytes: 0,
            last_report: now,
        }
    }

    pub fn counters(&self) -> &TransferStats {
        &self.counters
    }

    /// Throughput line for the period since the last report
    pub fn line(&self, now: Instant) -> String {
        let bytes = self.counters.bytes - self.last_bytes;
        let rate = throughput_bps(bytes, now.duration_since(self.last_report));
        format!(
            "[STATISTICS] Throughput: {}, Packets {}: {}",
            format_bandwidth(rate),
            self.label,
            self.counters.packets
        )
    }

    fn summary(&self) -> String {
        let elapsed = self.started.elapsed();
        format!(
            "[STATISTICS] Total: {} in {} ({}), packets {}: {}, retransmits: {}, corrupted: {}",
            format_bytes(self.counters.bytes),
            format_duration(elapsed),
            format_bandwidth(throughput_bps(self.counters.bytes, elapsed)),
            self.label,
            self.counters.packets,
            self.counters.retransmits,
            self.counters.corrupted
        )
    }
}

impl StatsSink for ThroughputReporter {
    fn record_packet(&mut self, bytes: usize) {
        self.counters.record_packet(bytes);
    }

    fn record_ack(&mut self, flag: ControlFlag) {
        self.counters.record_ack(flag);
    }

    fn record_corrupted(&mut self) {
        self.counters.record_corrupted();
    }

    fn record_ignored(&mut self) {
        self.counters.record_ignored();
    }

    fn record_retransmit(&mut self) {
        self.counters.record_retransmit();
    }

    fn report(&mut self, force: bool) {
        if force {
            self.counters.report(true);
            if self.enabled {
                println!("{}", self.summary());
            }
            return;
        }

        if !self.enabled || !self.timer.try_fire() {
            return;
        }
        let now = Instant::now();
        println!("{}", self.line(now));
        self.last_bytes = self.counters.bytes;
        self.last_report = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_format_bandwidth() {
        assert_eq!(format_bandwidth(999), "999 bps");
        assert_eq!(format_bandwidth(12_500_000), "12.50 Mbps");
        assert_eq!(format_bandwidth(2_000_000_000), "2.00 Gbps");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
    }

    #[test]
    fn test_throughput_bps() {
        assert_eq!(throughput_bps(1_000_000, Duration::from_secs(1)), 8_000_000);
        assert_eq!(throughput_bps(1_000, Duration::ZERO), 0);
    }

    #[test]
    fn test_reporter_counts_and_formats() {
        let mut reporter = ThroughputReporter::new(false, Duration::from_secs(1), "sent");
        reporter.record_packet(512);
        reporter.record_packet(512);
        reporter.record_retransmit();
        reporter.report(false);

        assert_eq!(reporter.counters().packets, 2);
        assert_eq!(reporter.counters().retransmits, 1);

        let line = reporter.line(Instant::now());
        assert!(line.starts_with("[STATISTICS] Throughput: "));
        assert!(line.ends_with("Packets sent: 2"));
    }
}
