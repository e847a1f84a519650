//! Client lifecycle state and event publication.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::listener::LifecycleEvent;

/// Registration handle for a lifecycle event listener.
///
/// The listener receives events until the registration is dropped.
#[derive(Debug)]
pub struct LifecycleListenerRegistration {
    id: Uuid,
    receiver: broadcast::Receiver<LifecycleEvent>,
}

impl LifecycleListenerRegistration {
    /// Returns the unique identifier for this registration.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns a mutable reference to the event receiver.
    pub fn receiver(&mut self) -> &mut broadcast::Receiver<LifecycleEvent> {
        &mut self.receiver
    }

    /// Receives the next lifecycle event.
    pub async fn recv(&mut self) -> std::result::Result<LifecycleEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

/// Tracks whether the client is running and publishes lifecycle events.
///
/// The invocation engine and the connection manager consult
/// [`is_running`](Self::is_running) before retrying or reconnecting.
#[derive(Debug)]
pub struct LifecycleService {
    running: AtomicBool,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleService {
    /// Creates a lifecycle service in the not-running state.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            running: AtomicBool::new(false),
            events,
        }
    }

    /// Returns `true` between start and the beginning of shutdown.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Marks the client as running and publishes `Starting`.
    pub(crate) fn start(&self) {
        self.running.store(true, Ordering::Release);
        self.emit(LifecycleEvent::Starting);
    }

    /// Clears the running flag. Returns `false` if it was already cleared.
    pub(crate) fn stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    /// Publishes an event to every registered listener.
    pub(crate) fn emit(&self, event: LifecycleEvent) {
        tracing::info!(event = %event, "client lifecycle event");
        let _ = self.events.send(event);
    }

    /// Adds a lifecycle event listener.
    pub fn add_lifecycle_listener(&self) -> LifecycleListenerRegistration {
        LifecycleListenerRegistration {
            id: Uuid::new_v4(),
            receiver: self.events.subscribe(),
        }
    }
}

impl Default for LifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
