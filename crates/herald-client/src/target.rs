//! Publish/subscribe registry behind the `open`, `message`, `error` and
//! named-event channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use herald_types::Notification;

/// A subscriber callback.
pub type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Opaque handle returned by [`EventTarget::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Listener {
    id: SubscriptionId,
    channel: String,
    handler: Handler,
}

/// Channel-keyed listener registry.
///
/// Handlers are invoked outside the registry lock, so a handler may subscribe,
/// unsubscribe or close the source it listens to.
#[derive(Default)]
pub struct EventTarget {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Listener>>,
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` on `channel`.
    pub fn subscribe(&self, channel: impl Into<String>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Listener {
                id,
                channel: channel.into(),
                handler,
            });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Deliver `notification` to every handler on `channel`, in subscription order.
    pub fn publish(&self, channel: &str, notification: &Notification) {
        let handlers: Vec<Handler> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.channel == channel)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        for handler in handlers {
            handler(notification);
        }
    }

    /// Drop every handler.
    pub fn clear(&self) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of handlers on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|l| l.channel == channel)
            .count()
    }
}

impl std::fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or_default();
        f.debug_struct("EventTarget")
            .field("listeners", &count)
            .finish()
    }
}
