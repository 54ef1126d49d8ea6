//! Best-effort fan-out of state messages to connected observers.
//!
//! Each observer is an unbounded channel drained by its own transport task,
//! so a broadcast never waits on a slow client. Observers whose receiving
//! side has gone away are pruned on the next broadcast.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::pipeline::messages::{AssistantState, StateMessage};

/// Identifier handed out by [`ObserverHub::subscribe`].
pub type ObserverId = u64;

/// Registry of observers receiving [`StateMessage`]s.
#[derive(Debug, Default)]
pub struct ObserverHub {
    next_id: AtomicU64,
    observers: Mutex<Vec<(ObserverId, mpsc::UnboundedSender<StateMessage>)>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<StateMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, tx));
        tracing::debug!(observer = id, "observer subscribed");
        (id, rx)
    }

    /// Remove an observer. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(oid, _)| *oid != id);
        tracing::debug!(observer = id, "observer unsubscribed");
    }

    /// Send `message` to every live observer, pruning closed ones.
    ///
    /// Returns the number of observers that accepted the message.
    pub fn broadcast(&self, message: StateMessage) -> usize {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.retain(|(id, tx)| {
            let ok = tx.send(message.clone()).is_ok();
            if !ok {
                tracing::debug!(observer = *id, "pruning closed observer");
            }
            ok
        });
        observers.len()
    }

    /// Broadcast a bare state change.
    pub fn announce(&self, state: AssistantState) -> usize {
        tracing::debug!(%state, "state");
        self.broadcast(StateMessage::state(state))
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
