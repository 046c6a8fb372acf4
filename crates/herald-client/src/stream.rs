//! Async stream view over an EventSource's channels.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use herald_types::Notification;
use tokio::sync::mpsc;

use crate::dispatcher::Shared;
use crate::target::{Handler, SubscriptionId};

/// An async stream of [`Notification`]s published on a set of channels.
///
/// Items arrive in dispatch order. The stream ends once the source has been
/// closed or failed and every queued notification has been delivered.
/// Dropping the stream removes its subscriptions.
pub struct NotificationStream {
    rx: mpsc::UnboundedReceiver<Notification>,
    subscriptions: Vec<SubscriptionId>,
    shared: Arc<Shared>,
}

impl NotificationStream {
    pub(crate) fn subscribe<I, S>(shared: Arc<Shared>, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = channels
            .into_iter()
            .map(|channel| {
                let tx = tx.clone();
                let handler: Handler = Arc::new(move |n: &Notification| {
                    let _ = tx.send(n.clone());
                });
                shared.target.subscribe(channel, handler)
            })
            .collect();

        Self {
            rx,
            subscriptions,
            shared,
        }
    }

    /// Receive the next notification, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.shared.target.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for NotificationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStream")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
