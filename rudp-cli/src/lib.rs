//! rudp CLI Library
//!
//! Shared functionality for rudp command-line tools.

pub mod config;
pub mod stats;

pub use config::{Config, ConfigError, ReceiverConfig, SenderConfig, TransportConfig};
pub use stats::{format_bandwidth, format_bytes, format_duration, ThroughputReporter};

use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr. `RUST_LOG` wins over the `debug` flag.
pub fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
