//! Timing utilities
//!
//! Flat timers only: every retry, dedup and report interval in the engines
//! is a fixed duration measured against the monotonic clock.

use std::time::{Duration, Instant};

/// Timer for periodic operations
///
/// Used for handshake retries and periodic statistics reports.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval
    pub fn new(interval: Duration) -> Self {
        Timer {
            interval,
            last_fire: Instant::now(),
        }
    }

    /// Interval between firings
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the timer has expired
    pub fn expired(&self) -> bool {
        self.last_fire.elapsed() >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self) -> Duration {
        self.interval.saturating_sub(self.last_fire.elapsed())
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        if self.expired() {
            self.reset();
            true
        } else {
            false
        }
    }
}

/// Optional point in time after which an operation gives up
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    limit: Option<Duration>,
}

impl Deadline {
    /// Deadline `limit` from now; `None` never expires
    pub fn after(limit: Option<Duration>) -> Self {
        Deadline {
            at: limit.map(|d| Instant::now() + d),
            limit,
        }
    }

    /// A deadline that never expires
    pub fn never() -> Self {
        Deadline {
            at: None,
            limit: None,
        }
    }

    /// Push the deadline back by its full limit
    pub fn extend(&mut self) {
        *self = Deadline::after(self.limit);
    }

    /// The configured limit, if any
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` for a deadline that never expires
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Check whether `stamp` is at least `age` old at `now`.
///
/// A missing stamp (never sent) always counts as old.
#[inline]
pub fn older_than(stamp: Option<Instant>, age: Duration, now: Instant) -> bool {
    match stamp {
        Some(at) => now.saturating_duration_since(at) >= age,
        None => true,
    }
}
