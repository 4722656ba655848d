//! Cross-component notifications.
//!
//! The hub is a publish/subscribe side channel, not a control-flow
//! dependency: publishing tolerates zero subscribers, so every component
//! stays independently testable without a live bus. Payloads carry the
//! correlating identifiers (`session_id`, `decision_id`, `payment_gate_id`).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::topology::Checkpoint;

/// Observable lifecycle notifications. Informational only — correctness
/// never depends on anyone listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    SessionStarted {
        session_id: String,
    },
    DecisionRequired {
        session_id: String,
        option_count: usize,
    },
    PaymentRequired {
        session_id: String,
        decision_id: String,
        payment_gate_id: String,
    },
    StateTransitionCompleted {
        session_id: String,
        decision_id: String,
        transition_id: String,
        level: u8,
        checkpoint: Checkpoint,
    },
    PaymentConfirmationProcessed {
        decision_id: String,
        payment_gate_id: String,
        approved: bool,
    },
    AuditEvent {
        entry_id: String,
        event_type: String,
    },
}

/// Broadcast fan-out for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers. A send with no subscribers is not
    /// an error.
    pub fn publish(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}
