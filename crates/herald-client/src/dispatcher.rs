//! Deferred, in-order delivery of notifications.
//!
//! The connection driver never calls subscriber code itself. It enqueues a
//! [`Task`]; a dedicated tokio task drains the queue in FIFO order and runs
//! each one exactly once. Every task re-checks the ready state before acting,
//! so work queued before a `close()` suppresses itself.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use herald_types::{DispatchableEvent, ERROR_CHANNEL, Notification, OPEN_CHANNEL, ReadyState};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::target::EventTarget;

/// State shared by the façade, the driver and the dispatcher.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    failed: AtomicBool,
    pub(crate) target: EventTarget,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ReadyState::Connecting.code()),
            failed: AtomicBool::new(false),
            target: EventTarget::new(),
        }
    }

    pub(crate) fn ready_state(&self) -> ReadyState {
        ReadyState::from_code(self.state.load(Ordering::SeqCst)).unwrap_or(ReadyState::Closed)
    }

    /// Move to `next` unless already CLOSED. Returns whether the move happened.
    pub(crate) fn transition(&self, next: ReadyState) -> bool {
        let closed = ReadyState::Closed.code();
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != closed).then_some(next.code())
            })
            .is_ok()
    }

    /// Whether the connection ended through fail-the-connection.
    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    fn run(&self, task: Task) {
        match task {
            Task::Announce => {
                if self.transition(ReadyState::Open) {
                    self.target.publish(OPEN_CHANNEL, &Notification::Open);
                }
            }
            Task::Deliver(event) => {
                if self.ready_state() == ReadyState::Closed {
                    debug!(event_type = %event.event_type(), "Dropping event queued before close");
                    return;
                }
                let notification = Notification::Message(event);
                self.target.publish(notification.channel(), &notification);
            }
            Task::Reconnecting { message, done } => {
                if self.transition(ReadyState::Connecting) {
                    let mut text = String::from("reconnecting");
                    if let Some(message) = message {
                        text.push(' ');
                        text.push_str(&message);
                    }
                    self.target
                        .publish(ERROR_CHANNEL, &Notification::Error { message: text });
                }
                let _ = done.send(());
            }
            Task::Fail { message } => {
                if self.transition(ReadyState::Closed) {
                    self.failed.store(true, Ordering::SeqCst);
                    self.target
                        .publish(ERROR_CHANNEL, &Notification::Error { message });
                }
            }
        }
    }
}

/// One "queue a task" step.
#[derive(Debug)]
pub(crate) enum Task {
    /// Announce the connection: OPEN, then the `open` notification.
    Announce,
    /// Deliver a server event.
    Deliver(DispatchableEvent),
    /// First step of reestablishing the connection. `done` fires once the
    /// step has run, whether or not it found the source closed.
    Reconnecting {
        message: Option<String>,
        done: oneshot::Sender<()>,
    },
    /// Fail the connection for good.
    Fail { message: String },
}

/// Sending side of the task queue.
#[derive(Debug, Clone)]
pub(crate) struct TaskQueue {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Spawn the dispatcher on the current runtime.
    ///
    /// Once every sender is gone and the backlog has run, nothing can be
    /// published again, so the handlers are released. That is what ends a
    /// [`NotificationStream`](crate::NotificationStream).
    pub(crate) fn spawn(shared: Arc<Shared>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                shared.run(task);
            }
            shared.target.clear();
            debug!("Task dispatcher finished");
        });
        Self { tx }
    }

    pub(crate) fn push(&self, task: Task) {
        if self.tx.send(task).is_err() {
            debug!("Task dispatcher has shut down; dropping task");
        }
    }
}
