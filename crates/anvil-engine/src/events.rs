//! Transition event log
//!
//! Every committed status change produces a [`TransitionEvent`]. The log keeps
//! the full history for inspection and fans events out over a broadcast
//! channel for live consumers (presentation layers subscribe; a lagging or
//! absent subscriber never blocks execution).

use anvil_action::{ActionId, ActionStatus, ArtifactId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// One committed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    /// Artifact owning the action.
    pub artifact_id: ArtifactId,
    /// The action whose status changed.
    pub action_id: ActionId,
    /// Status before the change.
    pub from: ActionStatus,
    /// Status after the change.
    pub to: ActionStatus,
    /// When the change was committed.
    pub at: DateTime<Utc>,
}

/// Append-only log of transition events with broadcast fan-out.
#[derive(Debug)]
pub struct TransitionLog {
    inner: Mutex<Vec<TransitionEvent>>,
    fanout: broadcast::Sender<TransitionEvent>,
}

impl TransitionLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        let (fanout, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Vec::new()),
            fanout,
        }
    }

    /// Record a committed transition and notify subscribers.
    pub fn append(&self, event: TransitionEvent) {
        self.inner.lock().push(event.clone());
        // No subscribers is fine.
        let _ = self.fanout.send(event);
    }

    /// Snapshot of all recorded events in commit order.
    #[must_use]
    pub fn events(&self) -> Vec<TransitionEvent> {
        self.inner.lock().clone()
    }

    /// Subscribe to transitions committed after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.fanout.subscribe()
    }
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::new()
    }
}
