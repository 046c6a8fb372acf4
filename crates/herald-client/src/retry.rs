//! Reconnection delay bookkeeping.
//!
//! The delay grows linearly: `reconnection_time * attempt`. Servers may change
//! `reconnection_time` with a `retry:` field; the attempt counter is reset
//! whenever a connection is announced.

use std::time::Duration;

/// Reconnection time used until the server sends a `retry:` field.
pub const DEFAULT_RECONNECTION_TIME: Duration = Duration::from_millis(10_000);

/// Retry counters that live for the whole lifetime of an EventSource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    reconnection_time: Duration,
    attempt: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECTION_TIME)
    }
}

impl RetryState {
    pub fn new(reconnection_time: Duration) -> Self {
        Self {
            reconnection_time,
            attempt: 0,
        }
    }

    pub fn reconnection_time(&self) -> Duration {
        self.reconnection_time
    }

    /// Replace the reconnection time (server `retry:` field).
    pub fn set_reconnection_time(&mut self, time: Duration) {
        self.reconnection_time = time;
    }

    /// Attempts since the last announced connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Count a new reconnection attempt and return the delay to wait before it.
    pub fn next_attempt(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay()
    }

    /// Delay for the current attempt.
    pub fn delay(&self) -> Duration {
        self.reconnection_time.saturating_mul(self.attempt)
    }

    /// Called when a connection is announced.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
