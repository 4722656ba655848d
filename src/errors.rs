//! Typed error hierarchy for the ascent orchestrator.
//!
//! Four top-level enums cover the four subsystems:
//! - `OrchestratorError` — public operation failures
//! - `TopologyError` — transition legality rejections
//! - `TrackerError` — state application failures
//! - `PaymentError` — payment gate lifecycle failures

use thiserror::Error;

/// Rejections from the static maturity topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("maturity level {level} is not part of the topology")]
    UnknownState { level: u8 },

    #[error(
        "transition {transition_id} is not legal from level {level} checkpoint {checkpoint}: {reason}"
    )]
    IllegalTransition {
        transition_id: String,
        level: u8,
        checkpoint: String,
        reason: String,
    },
}

/// Failures while applying a transition to the tracked state.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(
        "transition {transition_id} is stale: profile has moved to level {level} checkpoint {checkpoint}"
    )]
    StaleTransition {
        transition_id: String,
        level: u8,
        checkpoint: String,
    },

    #[error("transition {transition_id} requires a confirmed payment gate before it may execute")]
    PaymentUnconfirmed { transition_id: String },
}

/// Failures in the payment gate lifecycle.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gate {gate_id} not found")]
    UnknownGate { gate_id: String },

    #[error("payment gate {gate_id} was already resolved as {status}")]
    AlreadyResolved { gate_id: String, status: String },

    #[error("payment backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Errors surfaced by the public orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid decision: {reason}")]
    InvalidDecision { reason: String },

    #[error("invalid transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("session {session_id} not found")]
    UnknownSession { session_id: String },

    #[error("decision {decision_id} not found")]
    UnknownDecision { decision_id: String },

    #[error("decision {decision_id} has no associated payment gate")]
    NoPaymentGate { decision_id: String },

    #[error("payment gate {gate_id} was already resolved as {status}")]
    PaymentGateConflict { gate_id: String, status: String },

    #[error("payment rejected: {reason}")]
    PaymentRejected { reason: String },

    #[error("decision {decision_id} is {status} and can no longer be cancelled")]
    NotCancellable { decision_id: String, status: String },

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_error_illegal_transition_carries_context() {
        let err = TopologyError::IllegalTransition {
            transition_id: "9-C".to_string(),
            level: 1,
            checkpoint: "A".to_string(),
            reason: "no such outbound edge".to_string(),
        };
        match &err {
            TopologyError::IllegalTransition { transition_id, .. } => {
                assert_eq!(transition_id, "9-C");
            }
            _ => panic!("Expected IllegalTransition variant"),
        }
        assert!(err.to_string().contains("checkpoint A"));
    }

    #[test]
    fn tracker_error_stale_transition_names_current_position() {
        let err = TrackerError::StaleTransition {
            transition_id: "2-A".to_string(),
            level: 3,
            checkpoint: "B".to_string(),
        };
        assert!(err.to_string().contains("level 3"));
        assert!(matches!(err, TrackerError::StaleTransition { .. }));
    }

    #[test]
    fn payment_error_already_resolved_is_matchable() {
        let err = PaymentError::AlreadyResolved {
            gate_id: "gate-1".to_string(),
            status: "approved".to_string(),
        };
        match &err {
            PaymentError::AlreadyResolved { gate_id, status } => {
                assert_eq!(gate_id, "gate-1");
                assert_eq!(status, "approved");
            }
            _ => panic!("Expected AlreadyResolved"),
        }
    }

    #[test]
    fn orchestrator_error_converts_from_tracker_error() {
        let inner = TrackerError::PaymentUnconfirmed {
            transition_id: "2-B".to_string(),
        };
        let err: OrchestratorError = inner.into();
        match &err {
            OrchestratorError::Tracker(TrackerError::PaymentUnconfirmed { transition_id }) => {
                assert_eq!(transition_id, "2-B");
            }
            _ => panic!("Expected OrchestratorError::Tracker(PaymentUnconfirmed)"),
        }
    }

    #[test]
    fn orchestrator_error_converts_from_payment_error() {
        let inner = PaymentError::UnknownGate {
            gate_id: "gate-9".to_string(),
        };
        let err: OrchestratorError = inner.into();
        assert!(matches!(
            err,
            OrchestratorError::Payment(PaymentError::UnknownGate { .. })
        ));
    }

    #[test]
    fn orchestrator_error_variants_are_distinct() {
        let unknown_session = OrchestratorError::UnknownSession {
            session_id: "s".to_string(),
        };
        let unknown_decision = OrchestratorError::UnknownDecision {
            decision_id: "d".to_string(),
        };
        assert!(matches!(
            unknown_session,
            OrchestratorError::UnknownSession { .. }
        ));
        assert!(!matches!(
            unknown_session,
            OrchestratorError::UnknownDecision { .. }
        ));
        assert!(matches!(
            unknown_decision,
            OrchestratorError::UnknownDecision { .. }
        ));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&TopologyError::UnknownState { level: 9 });
        assert_std_error(&TrackerError::PaymentUnconfirmed {
            transition_id: "2-B".into(),
        });
        assert_std_error(&PaymentError::UnknownGate { gate_id: "g".into() });
        assert_std_error(&OrchestratorError::InvalidDecision {
            reason: "missing justification".into(),
        });
    }
}
