//! Transition Events
//!
//! Every committed transition emits exactly one event for the
//! messaging/notification layer. Events are emitted after, and only
//! after, durable commit - a subscriber never sees a "maybe happened"
//! transition.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::status::BarterStatus;
use super::types::BarterId;
use crate::core_types::UserId;

/// One committed status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub barter_id: BarterId,
    pub old_status: BarterStatus,
    pub new_status: BarterStatus,
    pub actor: UserId,
    /// Commit timestamp (millis)
    pub at: i64,
}

/// Sink for committed transitions
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransitionEvent);
}

/// Broadcast-channel sink: every subscriber sees every event
pub struct BroadcastSink {
    tx: broadcast::Sender<TransitionEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: TransitionEvent) {
        // No subscribers is not an error - the commit already happened
        let _ = self.tx.send(event);
    }
}

/// Sink that drops everything (embedded use without a messaging layer)
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: TransitionEvent) {}
}
