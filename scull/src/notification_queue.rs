//! Notification Queue
//!
//! Asynchronous "data ready" delivery for pipe subscribers.
//!
//! A subscriber is an open handle that opted in to async notification.
//! Each one gets its own broadcast channel; `notify` fans an event out to
//! all of them. Unlike a blocking read, a subscriber is never suspended by
//! the pipe: it learns about readiness and calls `read` when it wants to.
//!
//! # Unsubscribing
//!
//! Either call `unsubscribe` (done automatically when the handle is
//! released) or drop the `Receiver`; the stale channel is pruned on the
//! next `notify`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;

use crate::idgen::Handle;

/// Event delivered to async subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEvent {
    /// The pipe went from empty to non-empty
    Readable,
}

struct Subscriber {
    sender: broadcast::Sender<PipeEvent>,
    debug_hint: String,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("debug_hint", &self.debug_hint)
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

/// Thread-safe set of async subscribers keyed by handle
pub struct NotificationQueue {
    subscribers: Mutex<HashMap<Handle, Subscriber>>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe `handle`, replacing any earlier subscription it had.
    ///
    /// `channel_capacity` bounds how many undelivered events are buffered;
    /// a slow receiver sees `RecvError::Lagged` rather than blocking writers.
    #[must_use]
    pub fn subscribe(
        &self,
        handle: Handle,
        channel_capacity: usize,
        debug_hint: &str,
    ) -> broadcast::Receiver<PipeEvent> {
        let (sender, receiver) = broadcast::channel(channel_capacity.max(1));
        let mut subscribers = self.subscribers.lock();
        if let Some(old) = subscribers.insert(
            handle,
            Subscriber {
                sender,
                debug_hint: debug_hint.to_string(),
            },
        ) {
            log::warn!(
                "queue.subscribe: handle {handle:?} already subscribed (was: '{}')",
                old.debug_hint
            );
        }
        receiver
    }

    /// Remove `handle`; returns whether it was subscribed
    pub fn unsubscribe(&self, handle: Handle) -> bool {
        self.subscribers.lock().remove(&handle).is_some()
    }

    #[must_use]
    pub fn is_subscribed(&self, handle: Handle) -> bool {
        self.subscribers.lock().contains_key(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Deliver `event` to every subscriber
    pub fn notify(&self, event: PipeEvent) {
        let mut subscribers = self.subscribers.lock();

        log::debug!(
            "queue.notify: event={event:?}, subscribers: {}",
            subscribers.len()
        );

        subscribers.retain(|handle, sub| match sub.sender.send(event) {
            Ok(_) => true,
            Err(_) => {
                log::debug!(
                    "queue.notify: receiver dropped for handle {handle:?} (hint: {})",
                    sub.debug_hint
                );
                false
            }
        });
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.subscribers.lock().iter()).finish()
    }
}
