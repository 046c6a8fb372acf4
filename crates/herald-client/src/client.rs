//! The `EventSource` façade.

use std::sync::{Arc, Mutex, PoisonError};

use herald_types::{
    ERROR_CHANNEL, HeraldError, MESSAGE_TYPE, OPEN_CHANNEL, ReadyState,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ClientConfig;
use crate::connection::{CorsMode, Driver};
use crate::dispatcher::{Shared, TaskQueue};
use crate::stream::NotificationStream;
use crate::target::{Handler, SubscriptionId};
use crate::transport::{TcpTransport, Transport};
use crate::url::ParsedUrl;

/// Options passed alongside the URL when constructing an [`EventSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSourceInit {
    pub with_credentials: bool,
}

/// Builder for an [`EventSource`] that can register listeners before the
/// first connection attempt.
pub struct EventSourceBuilder {
    url: String,
    init: EventSourceInit,
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

impl EventSourceBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            init: EventSourceInit::default(),
            config: ClientConfig::default(),
            transport: Arc::new(TcpTransport),
            shared: Arc::new(Shared::new()),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.init.with_credentials = with_credentials;
        self
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of plain TCP.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Register a listener on `channel` before connecting.
    #[must_use]
    pub fn on(self, channel: impl Into<String>, handler: Handler) -> Self {
        self.shared.target.subscribe(channel, handler);
        self
    }

    /// Open a [`NotificationStream`] before connecting, so no early
    /// notification can be missed.
    pub fn notifications<I, S>(&self, channels: I) -> NotificationStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NotificationStream::subscribe(Arc::clone(&self.shared), channels)
    }

    /// Resolve the URL and start the connection in the background.
    ///
    /// Fails without any network activity if the URL cannot be resolved or
    /// the configuration is unusable. Must be called from inside a tokio
    /// runtime.
    pub fn connect(self) -> Result<EventSource, HeraldError> {
        let url = ParsedUrl::parse(&self.url)?;
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| HeraldError::NoRuntime)?;

        let cancel = CancellationToken::new();
        let tasks = {
            let _guard = runtime.enter();
            TaskQueue::spawn(Arc::clone(&self.shared))
        };
        let driver = Driver::new(
            url.clone(),
            Arc::new(self.config),
            self.transport,
            Arc::clone(&self.shared),
            tasks,
            cancel.clone(),
            CorsMode::from_credentials(self.init.with_credentials),
        );
        runtime.spawn(driver.run());

        info!(url = %url.absolute_url, with_credentials = self.init.with_credentials, "EventSource created");
        Ok(EventSource {
            url: url.absolute_url,
            with_credentials: self.init.with_credentials,
            shared: self.shared,
            cancel,
            slots: Mutex::default(),
        })
    }
}

impl std::fmt::Debug for EventSourceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSourceBuilder")
            .field("url", &self.url)
            .field("init", &self.init)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Subscriptions made through the `on*` handler attributes.
#[derive(Debug, Default)]
struct HandlerSlots {
    open: Option<SubscriptionId>,
    message: Option<SubscriptionId>,
    error: Option<SubscriptionId>,
}

/// A client for a server-sent event stream.
///
/// Connecting starts as soon as the source is created. Notifications are
/// delivered on a background task, never from inside a method call on this
/// type. Dropping the source closes it.
pub struct EventSource {
    url: String,
    with_credentials: bool,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    slots: Mutex<HandlerSlots>,
}

impl EventSource {
    /// Create a source over plain TCP with the default configuration.
    pub fn new(url: &str, init: EventSourceInit) -> Result<Self, HeraldError> {
        Self::builder(url)
            .with_credentials(init.with_credentials)
            .connect()
    }

    pub fn builder(url: impl Into<String>) -> EventSourceBuilder {
        EventSourceBuilder::new(url)
    }

    /// The resolved absolute URL. Also used as the origin of every event.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn with_credentials(&self) -> bool {
        self.with_credentials
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    /// Whether the source was closed by a fatal error rather than `close()`.
    pub fn has_failed(&self) -> bool {
        self.shared.has_failed()
    }

    /// Abort any connection or pending reconnection and move to CLOSED.
    /// Calling it again has no effect.
    pub fn close(&self) {
        if self.shared.transition(ReadyState::Closed) {
            info!(url = %self.url, "EventSource closed");
        }
        self.cancel.cancel();
    }

    pub fn set_onopen(&self, handler: Option<Handler>) {
        self.set_slot(OPEN_CHANNEL, handler, |slots| &mut slots.open);
    }

    pub fn set_onmessage(&self, handler: Option<Handler>) {
        self.set_slot(MESSAGE_TYPE, handler, |slots| &mut slots.message);
    }

    pub fn set_onerror(&self, handler: Option<Handler>) {
        self.set_slot(ERROR_CHANNEL, handler, |slots| &mut slots.error);
    }

    /// Listen on `channel`: `open`, `error`, `message`, or a named event type.
    pub fn add_event_listener(
        &self,
        channel: impl Into<String>,
        handler: Handler,
    ) -> SubscriptionId {
        self.shared.target.subscribe(channel, handler)
    }

    pub fn remove_event_listener(&self, id: SubscriptionId) -> bool {
        self.shared.target.unsubscribe(id)
    }

    /// Stream notifications from `channels`.
    pub fn notifications<I, S>(&self, channels: I) -> NotificationStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NotificationStream::subscribe(Arc::clone(&self.shared), channels)
    }

    fn set_slot(
        &self,
        channel: &str,
        handler: Option<Handler>,
        slot: impl FnOnce(&mut HandlerSlots) -> &mut Option<SubscriptionId>,
    ) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slot(&mut slots);
        if let Some(old) = slot.take() {
            self.shared.target.unsubscribe(old);
        }
        *slot = handler.map(|h| self.shared.target.subscribe(channel, h));
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.url)
            .field("with_credentials", &self.with_credentials)
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}
