//! rudp - Reliable ordered streaming over UDP
//!
//! High-level API: the sender and receiver engines plus the byte source,
//! byte sink and statistics capabilities they are generic over.
//!
//! ```no_run
//! use rudp::{EngineConfig, NullSink, Receiver};
//! use rudp::io::UdpConnection;
//!
//! let conn = UdpConnection::listen_on("0.0.0.0:9000".parse().unwrap());
//! let mut receiver = Receiver::new(conn, NullSink::new(), EngineConfig::default()).unwrap();
//! receiver.run().unwrap();
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod receiver;
pub mod sender;
pub mod stats;

pub use rudp_io as io;
pub use rudp_protocol as protocol;

pub use config::{ConfigError, EngineConfig};
pub use data::{ByteSink, ByteSource, DummySource, NullSink, ReaderSource, WriterSink};
pub use error::{ReceiverError, SenderError};
pub use receiver::Receiver;
pub use sender::{PacketInfo, Sender};
pub use stats::{StatsSink, TransferStats};
