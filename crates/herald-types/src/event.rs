//! Connection state and the payloads delivered to subscribers.

use serde::{Deserialize, Serialize};

/// Event type used for server events that carry no `event:` field.
pub const MESSAGE_TYPE: &str = "message";

/// Notification channel for connection announcements.
pub const OPEN_CHANNEL: &str = "open";

/// Notification channel for reconnection and fatal failures.
pub const ERROR_CHANNEL: &str = "error";

/// Lifecycle of an EventSource connection.
///
/// The numeric codes (0, 1, 2) are part of the public surface and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ReadyState {
    /// Not yet connected, or waiting to reconnect.
    Connecting = 0,
    /// Connected and dispatching events as they arrive.
    Open = 1,
    /// Terminal: a fatal error occurred or `close()` was called.
    Closed = 2,
}

impl ReadyState {
    /// The numeric code of this state.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a numeric code back to a state.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Connecting),
            1 => Some(Self::Open),
            2 => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => f.write_str("CONNECTING"),
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// A server event ready to be delivered.
///
/// Events never bubble and cannot be cancelled, so there is nothing beyond the
/// payload to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchableEvent {
    /// An event without an `event:` field, delivered on the `message` channel.
    Message { data: String, origin: String },
    /// An event with a server-chosen type, delivered on the channel of that name.
    Named {
        data: String,
        event_type: String,
        origin: String,
    },
}

impl DispatchableEvent {
    /// Build an event, choosing the variant from the (possibly empty) type buffer.
    pub fn new(data: String, event_type: String, origin: String) -> Self {
        if event_type.is_empty() {
            Self::Message { data, origin }
        } else {
            Self::Named {
                data,
                event_type,
                origin,
            }
        }
    }

    /// The channel this event is delivered on.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Message { .. } => MESSAGE_TYPE,
            Self::Named { event_type, .. } => event_type,
        }
    }

    pub fn data(&self) -> &str {
        match self {
            Self::Message { data, .. } | Self::Named { data, .. } => data,
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            Self::Message { origin, .. } | Self::Named { origin, .. } => origin,
        }
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The connection was announced (readyState became OPEN).
    Open,
    /// A server event.
    Message(DispatchableEvent),
    /// A reconnection is pending, or the connection failed for good.
    Error { message: String },
}

impl Notification {
    /// The channel this notification is published on.
    pub fn channel(&self) -> &str {
        match self {
            Self::Open => OPEN_CHANNEL,
            Self::Message(event) => event.event_type(),
            Self::Error { .. } => ERROR_CHANNEL,
        }
    }
}
