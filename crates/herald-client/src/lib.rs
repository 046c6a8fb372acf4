//! Server-sent events client: connection lifecycle, response validation,
//! event-stream parsing and notification dispatch for Herald.

mod client;
mod config;
mod connection;
mod dispatcher;
mod lines;
mod response;
mod retry;
mod sse;
mod stream;
mod target;
mod transport;
mod url;

pub use client::{EventSource, EventSourceBuilder, EventSourceInit};
pub use config::ClientConfig;
pub use connection::CorsMode;
pub use lines::{LineDecoder, LineTooLong};
pub use response::{EVENT_STREAM_MIME, ResponseValidator, Verdict};
pub use retry::{DEFAULT_RECONNECTION_TIME, RetryState};
pub use sse::EventStreamBuffers;
pub use stream::NotificationStream;
pub use target::{EventTarget, Handler, SubscriptionId};
pub use transport::{BoxedConnection, Connection, TcpTransport, Transport};
pub use url::{DEFAULT_PORT, ParsedUrl, Scheme};
