//! Maturity tracker: the single authoritative owner of the tracked
//! profile's current state.
//!
//! The tracker is reactive only. It never initiates a decision; it applies
//! transitions handed to it by the orchestrator and re-checks legality at
//! apply time, because the state may have moved between validation and
//! execution.

use std::sync::Arc;

use tracing::info;

use crate::errors::TrackerError;
use crate::events::{Notification, NotificationHub};
use crate::topology::{MaturityState, Topology};

/// Approval context for one state mutation.
///
/// Carrying the full decision payload here means the tracker cannot be
/// driven without an explicit, attributed human decision.
#[derive(Debug, Clone, Copy)]
pub struct ApprovedDecision<'a> {
    pub transition_id: &'a str,
    pub justification: &'a str,
    pub authorized_by: &'a str,
    pub payment_confirmed: bool,
    pub session_id: &'a str,
    pub decision_id: &'a str,
}

pub struct MaturityTracker {
    topology: Arc<Topology>,
    state: MaturityState,
    hub: NotificationHub,
}

impl MaturityTracker {
    pub fn new(topology: Arc<Topology>, initial: MaturityState, hub: NotificationHub) -> Self {
        Self {
            topology,
            state: initial,
            hub,
        }
    }

    /// Read-only snapshot of the current state.
    pub fn current_state(&self) -> MaturityState {
        self.state.clone()
    }

    /// Apply an approved transition.
    ///
    /// Legality is re-checked against the *current* state: a transition
    /// validated earlier against a state the profile has since left fails
    /// with [`TrackerError::StaleTransition`] instead of silently applying
    /// a different move. The swap is a single assignment — the state fully
    /// advances or does not change at all.
    pub fn apply_transition(
        &mut self,
        approved: &ApprovedDecision<'_>,
    ) -> Result<MaturityState, TrackerError> {
        let transition = self
            .topology
            .validate_transition(&self.state, approved.transition_id)
            .map_err(|_| TrackerError::StaleTransition {
                transition_id: approved.transition_id.to_string(),
                level: self.state.level,
                checkpoint: self.state.checkpoint.to_string(),
            })?;

        if transition.requires_payment_gate && !approved.payment_confirmed {
            return Err(TrackerError::PaymentUnconfirmed {
                transition_id: transition.id,
            });
        }

        let next = MaturityState::new(transition.to.level, transition.to.checkpoint);
        info!(
            transition = %transition.id,
            from = %self.state.position(),
            to = %next.position(),
            authorized_by = approved.authorized_by,
            "maturity transition applied"
        );
        self.state = next.clone();

        self.hub.publish(Notification::StateTransitionCompleted {
            session_id: approved.session_id.to_string(),
            decision_id: approved.decision_id.to_string(),
            transition_id: transition.id,
            level: next.level,
            checkpoint: next.checkpoint,
        });

        Ok(next)
    }
}
