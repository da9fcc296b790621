//! Engine configuration
//!
//! All intervals are flat: nothing backs off. Defaults match the constants
//! both endpoints were built with, so two default-configured engines agree
//! on the handshake negotiation.

use rudp_protocol::Negotiation;
use std::time::Duration;
use thiserror::Error;

/// Default sliding window size in packets
pub const DEFAULT_WINDOW_SIZE: u16 = 6666;

/// Default retransmission timeout
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default interval between handshake attempts
pub const DEFAULT_HANDSHAKE_RETRY: Duration = Duration::from_millis(1000);

/// Default number of FIN / FIN_ACK transmissions
pub const DEFAULT_FIN_ATTEMPTS: u32 = 5;

/// Default time to wait for the peer after each FIN / FIN_ACK
pub const DEFAULT_FIN_WAIT: Duration = Duration::from_secs(1);

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Window size must be at least 1 packet")]
    ZeroWindow,

    #[error("FIN attempts must be at least 1")]
    ZeroFinAttempts,
}

/// Tunables shared by the sender and receiver engines
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sliding window capacity in packets, also advertised in every header
    pub window_size: u16,
    /// Stop after this many DATA packets (`u32::MAX` = until the source ends)
    pub max_packets: u32,
    /// Values exchanged during the handshake
    pub negotiation: Negotiation,

    /// Resend an unacknowledged packet after this long
    pub retransmit_timeout: Duration,
    /// Minimum gap between two NACK-driven resends of the same packet
    pub nack_retry_interval: Duration,
    /// How long the sender waits for the first control packet of a pass
    pub ack_wait: Duration,
    /// How long the sender waits for each further control packet in a pass
    pub subsequent_ack_wait: Duration,
    /// Pause between sender loop iterations
    pub loop_sleep: Duration,

    /// Interval between handshake token transmissions
    pub handshake_retry: Duration,
    /// Give up on the handshake after this long (`None` = never)
    pub handshake_timeout: Option<Duration>,

    /// FIN / FIN_ACK transmissions before closing regardless
    pub fin_attempts: u32,
    /// Wait after each FIN / FIN_ACK transmission
    pub fin_wait: Duration,

    /// Receiver readiness poll interval
    pub poll_interval: Duration,
    /// Minimum gap between two ACKs for the same sequence number
    pub ack_dedup_interval: Duration,
    /// Minimum gap between two NACKs for the same sequence number
    pub nack_dedup_interval: Duration,
    /// Receiver gives up after this long without traffic (`None` = never)
    pub idle_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            max_packets: u32::MAX,
            negotiation: Negotiation::default(),
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            nack_retry_interval: Duration::from_millis(20),
            ack_wait: Duration::from_millis(1),
            subsequent_ack_wait: Duration::from_micros(100),
            loop_sleep: Duration::from_micros(10),
            handshake_retry: DEFAULT_HANDSHAKE_RETRY,
            handshake_timeout: None,
            fin_attempts: DEFAULT_FIN_ATTEMPTS,
            fin_wait: DEFAULT_FIN_WAIT,
            poll_interval: Duration::from_millis(1),
            ack_dedup_interval: Duration::from_millis(20),
            nack_dedup_interval: Duration::from_millis(20),
            idle_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Check values the engines cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.fin_attempts == 0 {
            return Err(ConfigError::ZeroFinAttempts);
        }
        Ok(())
    }

    /// Set the window size
    pub fn with_window_size(mut self, window_size: u16) -> Self {
        self.window_size = window_size;
        self
    }

    /// Limit the number of DATA packets sent
    pub fn with_max_packets(mut self, max_packets: u32) -> Self {
        self.max_packets = max_packets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window_size, 6666);
        assert_eq!(config.max_packets, u32::MAX);
        assert_eq!(config.fin_attempts, 5);
        assert_eq!(config.retransmit_timeout, Duration::from_secs(1));
        assert!(config.handshake_timeout.is_none());
        assert!(config.idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        let config = EngineConfig::default().with_window_size(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWindow)));

        let config = EngineConfig {
            fin_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroFinAttempts)));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_window_size(16)
            .with_max_packets(10);
        assert_eq!(config.window_size, 16);
        assert_eq!(config.max_packets, 10);
    }
}
