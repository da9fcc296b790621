//! rudp I/O and Platform Abstraction
//!
//! This crate provides the datagram transports the protocol engines run on:
//! the [`NetworkConnection`] capability, a UDP implementation, a
//! fault-injecting wrapper, an in-memory link for tests, and timing helpers.

pub mod connection;
pub mod faulty;
pub mod memory;
pub mod socket;
pub mod time;

pub use connection::{is_transient, NetworkConnection};
pub use faulty::FaultyConnection;
pub use memory::{Direction, Fate, LinkControl, LinkStats, MemoryLink, Policy};
pub use socket::{RudpSocket, SocketError, UdpConnection};
pub use time::{older_than, Deadline, Timer};
