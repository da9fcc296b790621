//! Engine errors

use crate::config::ConfigError;
use rudp_protocol::HandshakeError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Sender engine errors
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Byte source failed: {0}")]
    Source(#[source] io::Error),

    #[error("NACK for sequence {seq} which is not in flight (base {base}, next {next_seq})")]
    NackedPacketMissing { seq: u32, base: u32, next_seq: u32 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Receiver engine errors
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Byte sink failed: {0}")]
    Sink(#[source] io::Error),

    #[error("No traffic for {0:?}")]
    IdleTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
