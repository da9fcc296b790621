//! In-memory datagram link
//!
//! Two connected endpoints exchanging datagrams over `crossbeam` channels,
//! with an optional fault policy deciding the fate of every datagram. The
//! policy and the link counters are shared by both endpoints behind one
//! `parking_lot` mutex so a test can change the channel behaviour mid-run.
//!
//! Semantics follow UDP: sends always succeed, even once the peer is gone,
//! and nothing is ever delivered twice unless the policy duplicates it.

use crate::connection::NetworkConnection;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::Duration;

/// Which way a datagram travels through the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// From the first endpoint returned by [`MemoryLink::pair`] to the second
    Forward,
    /// From the second endpoint to the first
    Backward,
}

impl Direction {
    fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
        }
    }
}

/// What happens to a datagram in transit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Deliver,
    Drop,
    /// Deliver two copies
    Duplicate,
    /// Hold back until the next datagram in the same direction is delivered
    Hold,
}

/// Fault policy: decides the fate of each datagram
pub type Policy = Box<dyn FnMut(Direction, &[u8]) -> Fate + Send>;

/// Per-direction traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub held: u64,
}

struct Shared {
    policy: Option<Policy>,
    stats: [LinkStats; 2],
}

/// Handle to the shared state of a link
#[derive(Clone)]
pub struct LinkControl {
    shared: Arc<Mutex<Shared>>,
}

impl LinkControl {
    /// Replace the fault policy
    pub fn set_policy<F>(&self, policy: F)
    where
        F: FnMut(Direction, &[u8]) -> Fate + Send + 'static,
    {
        self.shared.lock().policy = Some(Box::new(policy));
    }

    /// Deliver everything from now on
    pub fn clear_policy(&self) {
        self.shared.lock().policy = None;
    }

    /// Counters for one direction
    pub fn stats(&self, direction: Direction) -> LinkStats {
        self.shared.lock().stats[direction.index()]
    }
}

/// One endpoint of an in-memory link
pub struct MemoryLink {
    outgoing: Direction,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    /// Datagram pulled off the channel by `ready` but not yet received
    pending: Option<Vec<u8>>,
    /// Datagram held back by a `Fate::Hold` decision
    held: Option<Vec<u8>>,
    control: LinkControl,
}

impl MemoryLink {
    /// Create a connected pair of endpoints with no faults
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let (forward_tx, forward_rx) = channel::unbounded();
        let (backward_tx, backward_rx) = channel::unbounded();
        let control = LinkControl {
            shared: Arc::new(Mutex::new(Shared {
                policy: None,
                stats: [LinkStats::default(); 2],
            })),
        };

        let first = MemoryLink {
            outgoing: Direction::Forward,
            tx: forward_tx,
            rx: backward_rx,
            pending: None,
            held: None,
            control: control.clone(),
        };
        let second = MemoryLink {
            outgoing: Direction::Backward,
            tx: backward_tx,
            rx: forward_rx,
            pending: None,
            held: None,
            control,
        };
        (first, second)
    }

    /// Create a connected pair whose traffic goes through `policy`
    pub fn pair_with_policy<F>(policy: F) -> (MemoryLink, MemoryLink)
    where
        F: FnMut(Direction, &[u8]) -> Fate + Send + 'static,
    {
        let (first, second) = MemoryLink::pair();
        first.control().set_policy(policy);
        (first, second)
    }

    /// Handle to the link's policy and counters
    pub fn control(&self) -> LinkControl {
        self.control.clone()
    }

    fn push(&self, datagram: Vec<u8>) {
        // A vanished peer is a silent loss, as with UDP
        let _ = self.tx.send(datagram);
    }

    fn copy_out(datagram: &[u8], buf: &mut [u8]) -> usize {
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        n
    }
}

impl NetworkConnection for MemoryLink {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        let fate = {
            let mut shared = self.control.shared.lock();
            let fate = match shared.policy.as_mut() {
                Some(policy) => policy(self.outgoing, datagram),
                None => Fate::Deliver,
            };

            let stats = &mut shared.stats[self.outgoing.index()];
            stats.sent += 1;
            match fate {
                Fate::Deliver => stats.delivered += 1,
                Fate::Drop => stats.dropped += 1,
                Fate::Duplicate => {
                    stats.delivered += 1;
                    stats.duplicated += 1;
                }
                Fate::Hold => stats.held += 1,
            }
            fate
        };

        match fate {
            Fate::Drop => {}
            Fate::Hold => {
                if let Some(previous) = self.held.replace(datagram.to_vec()) {
                    self.push(previous);
                }
            }
            Fate::Deliver | Fate::Duplicate => {
                self.push(datagram.to_vec());
                if fate == Fate::Duplicate {
                    self.push(datagram.to_vec());
                }
                if let Some(held) = self.held.take() {
                    self.push(held);
                }
            }
        }
        Ok(datagram.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(datagram) = self.pending.take() {
            return Ok(Self::copy_out(&datagram, buf));
        }

        match self.rx.try_recv() {
            Ok(datagram) => Ok(Self::copy_out(&datagram, buf)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                Err(io::Error::new(ErrorKind::WouldBlock, "no datagram available"))
            }
        }
    }

    fn ready(&mut self, timeout: Duration) -> bool {
        if self.pending.is_some() {
            return true;
        }

        let next = if timeout.is_zero() {
            self.rx.try_recv().ok()
        } else {
            match self.rx.recv_timeout(timeout) {
                Ok(datagram) => Some(datagram),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    // Peer is gone; behave like a silent socket
                    std::thread::sleep(timeout);
                    None
                }
            }
        };

        self.pending = next;
        self.pending.is_some()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(held) = self.held.take() {
            self.push(held);
        }
        Ok(())
    }
}
