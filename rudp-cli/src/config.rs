//! Configuration file support for rudp CLI tools
//!
//! Every field is optional in the file; missing values fall back to the
//! engine defaults. Command-line flags override whatever the file says.

use rudp::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Protocol timing and window settings shared by both tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Sliding window size in packets
    #[serde(default = "default_window_size")]
    pub window_size: u16,
    /// Retransmission timeout in milliseconds
    #[serde(default = "default_retransmit_timeout")]
    pub retransmit_timeout_ms: u64,
    /// Minimum gap between NACK-driven resends in milliseconds
    #[serde(default = "default_dedup_interval")]
    pub nack_retry_interval_ms: u64,
    /// Interval between handshake attempts in milliseconds
    #[serde(default = "default_handshake_retry")]
    pub handshake_retry_ms: u64,
    /// Give up on the handshake after this many milliseconds
    pub handshake_timeout_ms: Option<u64>,
    /// FIN / FIN_ACK transmissions before closing
    #[serde(default = "default_fin_attempts")]
    pub fin_attempts: u32,
    /// Wait after each FIN / FIN_ACK in milliseconds
    #[serde(default = "default_fin_wait")]
    pub fin_wait_ms: u64,
    /// Minimum gap between ACKs for the same sequence in milliseconds
    #[serde(default = "default_dedup_interval")]
    pub ack_dedup_interval_ms: u64,
    /// Minimum gap between NACKs for the same sequence in milliseconds
    #[serde(default = "default_dedup_interval")]
    pub nack_dedup_interval_ms: u64,
    /// Receiver gives up after this many milliseconds without traffic
    pub idle_timeout_ms: Option<u64>,
    /// Statistics interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_window_size() -> u16 {
    rudp::config::DEFAULT_WINDOW_SIZE
}

fn default_retransmit_timeout() -> u64 {
    rudp::config::DEFAULT_RETRANSMIT_TIMEOUT.as_millis() as u64
}

fn default_handshake_retry() -> u64 {
    rudp::config::DEFAULT_HANDSHAKE_RETRY.as_millis() as u64
}

fn default_fin_attempts() -> u32 {
    rudp::config::DEFAULT_FIN_ATTEMPTS
}

fn default_fin_wait() -> u64 {
    rudp::config::DEFAULT_FIN_WAIT.as_millis() as u64
}

fn default_dedup_interval() -> u64 {
    20
}

fn default_stats_interval() -> u64 {
    1
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            window_size: default_window_size(),
            retransmit_timeout_ms: default_retransmit_timeout(),
            nack_retry_interval_ms: default_dedup_interval(),
            handshake_retry_ms: default_handshake_retry(),
            handshake_timeout_ms: None,
            fin_attempts: default_fin_attempts(),
            fin_wait_ms: default_fin_wait(),
            ack_dedup_interval_ms: default_dedup_interval(),
            nack_dedup_interval_ms: default_dedup_interval(),
            idle_timeout_ms: None,
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl TransportConfig {
    /// Build and validate the engine configuration
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let config = EngineConfig {
            window_size: self.window_size,
            retransmit_timeout: Duration::from_millis(self.retransmit_timeout_ms),
            nack_retry_interval: Duration::from_millis(self.nack_retry_interval_ms),
            handshake_retry: Duration::from_millis(self.handshake_retry_ms),
            handshake_timeout: self.handshake_timeout_ms.map(Duration::from_millis),
            fin_attempts: self.fin_attempts,
            fin_wait: Duration::from_millis(self.fin_wait_ms),
            ack_dedup_interval: Duration::from_millis(self.ack_dedup_interval_ms),
            nack_dedup_interval: Duration::from_millis(self.nack_dedup_interval_ms),
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
            ..EngineConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
}

/// Sender configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Input file ("-" for stdin); dummy data when absent
    pub input: Option<String>,
    /// Stop after this many packets
    pub max_packets: Option<u32>,
}

/// Receiver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Output file ("-" for stdout)
    pub output: Option<String>,
    /// Proportion of received datagrams to corrupt (testing only)
    #[serde(default)]
    pub error_rate: f32,
    /// Only corrupt DATA packets
    #[serde(default)]
    pub data_only: bool,
    /// Seed for reproducible corruption
    pub seed: Option<u64>,
    /// Kernel receive buffer size in bytes
    pub recv_buffer_size: Option<usize>,
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Protocol settings
    #[serde(default)]
    pub transport: TransportConfig,
    /// Sender configuration
    pub sender: Option<SenderConfig>,
    /// Receiver configuration
    pub receiver: Option<ReceiverConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Config::default()),
        }
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            transport: TransportConfig::default(),
            sender: Some(SenderConfig {
                input: Some("-".to_string()),
                max_packets: Some(100_000),
            }),
            receiver: None,
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            transport: TransportConfig {
                idle_timeout_ms: Some(30_000),
                ..TransportConfig::default()
            },
            sender: None,
            receiver: Some(ReceiverConfig {
                output: Some("received.bin".to_string()),
                recv_buffer_size: Some(4 * 1024 * 1024),
                ..ReceiverConfig::default()
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] rudp::ConfigError),
}
