//! Engine-level configuration for an EventSource.

use std::time::Duration;

use herald_types::ConfigError;

use crate::retry::DEFAULT_RECONNECTION_TIME;

/// Tunables for the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base reconnection delay until the server sends `retry:`.
    pub reconnection_time: Duration,
    /// How long a transport connect may take before it counts as a network error.
    pub connect_timeout: Duration,
    /// Consecutive redirects followed before the connection is failed.
    pub max_redirects: u32,
    /// Reconnection attempts allowed since the last successful open (None = unlimited).
    pub max_reconnect_attempts: Option<u32>,
    /// Size of the read buffer handed to the transport.
    pub read_buffer_size: usize,
    /// Longest line the stream may send, and the cap on the response head.
    /// Going over it is treated as a network error.
    pub max_line_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnection_time: DEFAULT_RECONNECTION_TIME,
            connect_timeout: Duration::from_secs(10),
            max_redirects: 20,
            max_reconnect_attempts: None,
            read_buffer_size: 8 * 1024,
            max_line_length: 64 * 1024,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn reconnection_time(mut self, time: Duration) -> Self {
        self.reconnection_time = time;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    #[must_use]
    pub fn max_reconnect_attempts(mut self, max: Option<u32>) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    #[must_use]
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }

    /// Check the values for ones the driver cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "connect_timeout".into(),
                message: "must be > 0".into(),
            });
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "read_buffer_size".into(),
                message: "must be > 0".into(),
            });
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_line_length".into(),
                message: "must be > 0".into(),
            });
        }
        Ok(())
    }
}
