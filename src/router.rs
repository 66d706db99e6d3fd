//! Single-subscriber fan-out for decoded push events.
//!
//! DESIGN
//! ======
//! At most one handler is bound at a time; binding replaces the previous one.
//! Nothing is buffered: events that arrive while no handler is bound are
//! dropped. The handler is cloned out of the slot and invoked outside the
//! lock, so a handler may itself rebind without deadlocking.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::events::{EventKind, PushEvent};

/// A bound push-event handler.
pub type Subscriber = Arc<dyn Fn(&PushEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct EventRouter {
    slot: Arc<Mutex<Option<Subscriber>>>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter").field("bound", &self.is_bound()).finish()
    }
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler`, returning whichever one it replaced.
    pub fn bind<F>(&self, handler: F) -> Option<Subscriber>
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.slot().replace(Arc::new(handler))
    }

    /// Bind a handler that forwards every event into an unbounded channel.
    pub fn bind_channel(&self) -> mpsc::UnboundedReceiver<PushEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bind(move |event| {
            // Receiver gone means the consumer stopped listening.
            let _ = tx.send(event.clone());
        });
        rx
    }

    pub fn unbind(&self) -> Option<Subscriber> {
        self.slot().take()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot().is_some()
    }

    /// Decode one raw socket message and hand it to the subscriber.
    ///
    /// Returns the decoded event so the socket can react to control tags.
    /// Malformed messages are logged and dropped.
    pub fn on_message(&self, raw: &str) -> Option<PushEvent> {
        match PushEvent::decode(raw) {
            Ok(event) => {
                self.dispatch(&event);
                Some(event)
            }
            Err(e) => {
                tracing::warn!(error = %e, len = raw.len(), "dropping malformed push message");
                None
            }
        }
    }

    /// Deliver a locally produced event (`_disconnected`, `_reconnected`).
    pub fn emit(&self, kind: EventKind) {
        self.dispatch(&PushEvent::local(kind));
    }

    fn dispatch(&self, event: &PushEvent) {
        let handler = self.slot().clone();
        match handler {
            Some(handler) => handler(event),
            None => tracing::trace!(tag = event.tag(), "no push subscriber bound; event dropped"),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Subscriber>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
