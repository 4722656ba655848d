//! Integration tests for the ascent orchestrator.
//!
//! These exercise the full decision lifecycle over the public API: session
//! start, options presentation, direct and payment-gated execution, failure
//! paths, expiry, and the audit/compliance guarantees.

use std::sync::Arc;

use serde_json::json;

use ascent::audit::ReportOptions;
use ascent::config::OrchestratorConfig;
use ascent::errors::OrchestratorError;
use ascent::ids::SequentialProvider;
use ascent::orchestrator::{DecisionRequest, DecisionStatus, Orchestrator};
use ascent::payment::{PaymentConfirmation, ReferenceBackend};
use ascent::policy::StandardPolicy;
use ascent::topology::Checkpoint;

/// Orchestrator with deterministic ids and the shipped collaborators.
fn orchestrator() -> Orchestrator {
    orchestrator_with_config(OrchestratorConfig::default())
}

fn orchestrator_with_config(config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::with_collaborators(
        config,
        Arc::new(ReferenceBackend),
        Arc::new(StandardPolicy),
        Arc::new(SequentialProvider::default()),
    )
    .unwrap()
}

fn decision(transition: &str) -> DecisionRequest {
    DecisionRequest {
        selected_transition: transition.to_string(),
        justification: "ready".to_string(),
        authorized_by: "alice".to_string(),
    }
}

fn approved_confirmation() -> PaymentConfirmation {
    PaymentConfirmation {
        confirmed: true,
        transaction_reference: Some("txn-100".to_string()),
        amount: Some("$12,000".to_string()),
        note: None,
    }
}

fn rejected_confirmation() -> PaymentConfirmation {
    PaymentConfirmation {
        confirmed: false,
        transaction_reference: None,
        amount: None,
        note: Some("declined".to_string()),
    }
}

async fn started(orchestrator: &Orchestrator) -> String {
    orchestrator
        .start_session(json!({"project": "atlas"}))
        .await
        .unwrap()
        .session_id
}

// =============================================================================
// Sessions and option presentation
// =============================================================================

mod sessions {
    use super::*;

    #[tokio::test]
    async fn test_start_session_presents_initial_options() {
        let orchestrator = orchestrator();
        let start = orchestrator
            .start_session(json!({"project": "atlas"}))
            .await
            .unwrap();

        assert_eq!(start.session_id, "session-0001");
        assert_eq!(start.session.status, "active");
        let presentation = &start.initial_presentation;
        assert_eq!(presentation.current_state.level, 1);
        assert_eq!(presentation.current_state.checkpoint, Checkpoint::A);
        assert!(presentation.option_count() > 0);
    }

    #[tokio::test]
    async fn test_options_partition_by_payment_gate() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let presentation = orchestrator.present_options(&session_id).await.unwrap();
        let free: Vec<&str> = presentation
            .without_payment
            .iter()
            .map(|o| o.transition_id.as_str())
            .collect();
        let gated: Vec<&str> = presentation
            .with_payment
            .iter()
            .map(|o| o.transition_id.as_str())
            .collect();

        assert_eq!(free, vec!["2-A"]);
        assert_eq!(gated, vec!["2-B"]);
        assert_eq!(
            presentation.with_payment[0].amount_estimate.as_deref(),
            Some("$5,000–$50,000")
        );
        // Presentation describes, never ranks.
        assert_eq!(presentation.without_payment[0].effort_estimate, "2-4 weeks");
    }

    #[tokio::test]
    async fn test_present_options_unknown_session() {
        let orchestrator = orchestrator();
        let err = orchestrator.present_options("session-9999").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownSession { .. }));
        // The miss itself is audited.
        assert!(orchestrator.get_status().await.audit_trail_count >= 1);
    }

    #[tokio::test]
    async fn test_independent_sessions_share_one_profile() {
        let orchestrator = orchestrator();
        let first = started(&orchestrator).await;
        let second = started(&orchestrator).await;
        assert_ne!(first, second);
        assert_eq!(orchestrator.get_status().await.session_count, 2);
    }
}

// =============================================================================
// Direct (payment-free) decision path
// =============================================================================

mod direct_decisions {
    use super::*;

    #[tokio::test]
    async fn test_valid_decision_completes_and_advances_once() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let result = orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();

        assert_eq!(result.status, DecisionStatus::Completed);
        let new_state = result.new_state.unwrap();
        assert_eq!(new_state.level, 2);
        assert_eq!(new_state.checkpoint, Checkpoint::A);

        // Completed decisions leave the pending registry...
        assert!(orchestrator.pending_decisions().await.is_empty());
        // ...but stay queryable in the archive.
        let archived = orchestrator.decision(&result.decision_id).await.unwrap();
        assert_eq!(archived.status, DecisionStatus::Completed);

        // The tracker moved exactly once and fresh options reflect it.
        assert_eq!(orchestrator.current_state().await.level, 2);
        let next = result.next_options.unwrap();
        assert_eq!(next.current_state.level, 2);
    }

    #[tokio::test]
    async fn test_missing_justification_is_invalid_and_mutates_nothing() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let mut bad = decision("2-A");
        bad.justification = String::new();
        let err = orchestrator
            .submit_decision(&session_id, bad)
            .await
            .unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidDecision { .. }));
        assert_eq!(orchestrator.current_state().await.level, 1);
        assert!(orchestrator.pending_decisions().await.is_empty());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected_and_queryable() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let err = orchestrator
            .submit_decision(&session_id, decision("5-C"))
            .await
            .unwrap_err();
        match err {
            OrchestratorError::InvalidTransition { reason } => {
                assert!(reason.contains("2-A"), "reason should list legal edges: {reason}");
            }
            other => panic!("Expected InvalidTransition, got {other:?}"),
        }

        assert_eq!(orchestrator.current_state().await.level, 1);
        // The rejected gate stays in the registry for inspection.
        let pending = orchestrator.pending_decisions().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, DecisionStatus::Rejected);
        assert!(pending[0].error.is_some());
    }

    #[tokio::test]
    async fn test_decision_against_unknown_session_fails() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .submit_decision("session-9999", decision("2-A"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownSession { .. }));
    }
}

// =============================================================================
// Payment-gated decision path
// =============================================================================

mod payment_gated_decisions {
    use super::*;

    #[tokio::test]
    async fn test_gated_decision_parks_until_confirmation() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let result = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();

        assert_eq!(result.status, DecisionStatus::AwaitingPayment);
        let gate_view = result.payment_gate.unwrap();
        assert_eq!(gate_view.amount_estimate, "$5,000–$50,000");
        assert!(gate_view.instructions.contains("external payment backend"));

        // No state change before the confirmation arrives.
        assert_eq!(orchestrator.current_state().await.level, 1);
        let status = orchestrator.get_status().await;
        assert_eq!(status.pending_decisions, 1);
        assert_eq!(status.pending_payment_gates, 1);
    }

    #[tokio::test]
    async fn test_approved_confirmation_executes_exactly_once() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();

        let result = orchestrator
            .confirm_payment(&session_id, &parked.decision_id, approved_confirmation())
            .await
            .unwrap();

        assert_eq!(result.status, DecisionStatus::Completed);
        let state = orchestrator.current_state().await;
        assert_eq!(state.level, 2);
        assert_eq!(state.checkpoint, Checkpoint::B);

        let status = orchestrator.get_status().await;
        assert_eq!(status.pending_decisions, 0);
        assert_eq!(status.pending_payment_gates, 0);
    }

    #[tokio::test]
    async fn test_rejected_confirmation_leaves_state_untouched() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();

        let err = orchestrator
            .confirm_payment(&session_id, &parked.decision_id, rejected_confirmation())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PaymentRejected { .. }));

        assert_eq!(orchestrator.current_state().await.level, 1);
        let gate = orchestrator.decision(&parked.decision_id).await.unwrap();
        assert_eq!(gate.status, DecisionStatus::PaymentRejected);
        assert!(gate.error.is_some());

        // No automatic retry: a fresh submission is the only way forward,
        // and it mints a new decision with a new payment gate.
        let retry = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        assert_eq!(retry.status, DecisionStatus::AwaitingPayment);
        assert_ne!(retry.decision_id, parked.decision_id);
    }

    #[tokio::test]
    async fn test_double_confirmation_conflicts_and_keeps_first_resolution() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        orchestrator
            .confirm_payment(&session_id, &parked.decision_id, approved_confirmation())
            .await
            .unwrap();

        let err = orchestrator
            .confirm_payment(&session_id, &parked.decision_id, rejected_confirmation())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PaymentGateConflict { .. }));

        // First resolution intact: still at 2-B, decision still completed.
        assert_eq!(orchestrator.current_state().await.checkpoint, Checkpoint::B);
        assert_eq!(
            orchestrator.decision(&parked.decision_id).await.unwrap().status,
            DecisionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_confirm_payment_preconditions() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        // Unknown decision.
        let err = orchestrator
            .confirm_payment(&session_id, "decision-9999", approved_confirmation())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownDecision { .. }));

        // Decision without a payment gate: an illegal-transition attempt
        // stays in the registry gateless.
        let _ = orchestrator
            .submit_decision(&session_id, decision("5-C"))
            .await
            .unwrap_err();
        let pending = orchestrator.pending_decisions().await;
        let err = orchestrator
            .confirm_payment(&session_id, &pending[0].id, approved_confirmation())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NoPaymentGate { .. }));
    }

    #[tokio::test]
    async fn test_parked_decision_goes_stale_if_profile_moves() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        // The profile moves while the payment decision waits on a human.
        orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();

        let err = orchestrator
            .confirm_payment(&session_id, &parked.decision_id, approved_confirmation())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::Tracker(ascent::TrackerError::StaleTransition { .. })
        ));

        // Atomicity: the failed apply changed nothing beyond the first move.
        assert_eq!(orchestrator.current_state().await.checkpoint, Checkpoint::A);
        assert_eq!(
            orchestrator.decision(&parked.decision_id).await.unwrap().status,
            DecisionStatus::Failed
        );
    }
}

// =============================================================================
// Cancellation and expiry
// =============================================================================

mod cancellation_and_expiry {
    use super::*;

    #[tokio::test]
    async fn test_cancel_parked_decision_abandons_gate() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        let cancelled = orchestrator
            .cancel_decision(&session_id, &parked.decision_id, "alice")
            .await
            .unwrap();

        assert_eq!(cancelled.status, DecisionStatus::Failed);
        assert!(cancelled.error.unwrap().contains("cancelled by alice"));
        assert_eq!(orchestrator.get_status().await.pending_payment_gates, 0);

        let report = orchestrator.payment_report().await;
        assert_eq!(report.abandoned, 1);
    }

    #[tokio::test]
    async fn test_completed_decision_is_not_cancellable() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let done = orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();
        let err = orchestrator
            .cancel_decision(&session_id, &done.decision_id, "alice")
            .await
            .unwrap_err();
        // Completed gates have left the pending registry entirely.
        assert!(matches!(err, OrchestratorError::UnknownDecision { .. }));
    }

    #[tokio::test]
    async fn test_sweep_fails_expired_decisions() {
        let config = OrchestratorConfig {
            decision_expiry: Some(chrono::Duration::milliseconds(-1)),
            ..OrchestratorConfig::default()
        };
        let orchestrator = orchestrator_with_config(config);
        let session_id = started(&orchestrator).await;

        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();

        let expired = orchestrator.sweep_expired_decisions().await.unwrap();
        assert_eq!(expired, vec![parked.decision_id.clone()]);

        let gate = orchestrator.decision(&parked.decision_id).await.unwrap();
        assert_eq!(gate.status, DecisionStatus::Failed);
        assert!(gate.error.unwrap().contains("expired"));
        assert_eq!(orchestrator.payment_report().await.abandoned, 1);
    }

    #[tokio::test]
    async fn test_sweep_without_expiry_is_a_noop() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;
        orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        assert!(orchestrator.sweep_expired_decisions().await.unwrap().is_empty());
        assert_eq!(orchestrator.get_status().await.pending_decisions, 1);
    }
}

// =============================================================================
// Compliance flags and audit trail
// =============================================================================

mod compliance {
    use super::*;

    #[tokio::test]
    async fn test_flags_stay_true_through_failures() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        // Walk through every failure class.
        let mut bad = decision("2-A");
        bad.justification = String::new();
        let _ = orchestrator.submit_decision(&session_id, bad).await;
        let _ = orchestrator.submit_decision(&session_id, decision("5-C")).await;
        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        let _ = orchestrator
            .confirm_payment(&session_id, &parked.decision_id, rejected_confirmation())
            .await;

        let status = orchestrator.get_status().await;
        assert!(status.human_approval_required);
        assert!(status.automation_locked);

        let report = orchestrator.audit_report(ReportOptions::default()).await;
        assert!(report.human_approval_required);
        assert!(report.automation_locked);
        assert_eq!(report.failed_decisions, 2);
        assert_eq!(report.completed_decisions, 0);
    }

    #[tokio::test]
    async fn test_audit_trail_grows_on_every_public_call() {
        let orchestrator = orchestrator();

        let before = orchestrator.get_status().await.audit_trail_count;
        let session_id = started(&orchestrator).await;
        let after_start = orchestrator.get_status().await.audit_trail_count;
        assert!(after_start > before);

        orchestrator.present_options(&session_id).await.unwrap();
        let after_options = orchestrator.get_status().await.audit_trail_count;
        assert!(after_options > after_start);

        orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();
        let after_submit = orchestrator.get_status().await.audit_trail_count;
        assert!(after_submit > after_options);

        // Failures are audited too.
        let _ = orchestrator
            .submit_decision(&session_id, decision("9-Z"))
            .await
            .unwrap_err();
        assert!(orchestrator.get_status().await.audit_trail_count > after_submit);
    }

    #[tokio::test]
    async fn test_audit_entries_are_append_only() {
        let orchestrator = orchestrator();
        let session_id = started(&orchestrator).await;

        let first = orchestrator
            .audit_report(ReportOptions {
                include_full_trail: true,
            })
            .await
            .entries
            .unwrap();

        orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();

        let second = orchestrator
            .audit_report(ReportOptions {
                include_full_trail: true,
            })
            .await
            .entries
            .unwrap();

        assert!(second.len() > first.len());
        // Prior entries are bit-for-bit stable.
        for (before, after) in first.iter().zip(second.iter()) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.seq, after.seq);
            assert_eq!(before.timestamp, after.timestamp);
        }
        // seq is strictly increasing.
        for pair in second.windows(2) {
            assert!(pair[0].seq < pair[1].seq);
        }
    }

    #[tokio::test]
    async fn test_audit_trail_mirrors_to_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let config = OrchestratorConfig {
            audit_log_file: Some(path.clone()),
            ..OrchestratorConfig::default()
        };
        let orchestrator = orchestrator_with_config(config);
        let session_id = started(&orchestrator).await;
        orchestrator
            .submit_decision(&session_id, decision("2-A"))
            .await
            .unwrap();

        let lines = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            lines.lines().count(),
            orchestrator.get_status().await.audit_trail_count
        );
        assert!(lines.contains("state_transition_completed"));
    }
}

// =============================================================================
// Notifications
// =============================================================================

mod notifications {
    use super::*;
    use ascent::events::Notification;

    #[tokio::test]
    async fn test_full_lifecycle_emits_correlated_notifications() {
        let orchestrator = orchestrator();
        let mut rx = orchestrator.subscribe();

        let session_id = started(&orchestrator).await;
        let parked = orchestrator
            .submit_decision(&session_id, decision("2-B"))
            .await
            .unwrap();
        orchestrator
            .confirm_payment(&session_id, &parked.decision_id, approved_confirmation())
            .await
            .unwrap();

        let mut saw_payment_required = false;
        let mut saw_completed = false;
        while let Ok(notification) = rx.try_recv() {
            match notification {
                Notification::PaymentRequired {
                    session_id: sid,
                    decision_id,
                    payment_gate_id,
                } => {
                    assert_eq!(sid, session_id);
                    assert_eq!(decision_id, parked.decision_id);
                    assert!(!payment_gate_id.is_empty());
                    saw_payment_required = true;
                }
                Notification::StateTransitionCompleted {
                    decision_id,
                    transition_id,
                    level,
                    ..
                } => {
                    assert_eq!(decision_id, parked.decision_id);
                    assert_eq!(transition_id, "2-B");
                    assert_eq!(level, 2);
                    saw_completed = true;
                }
                _ => {}
            }
        }
        assert!(saw_payment_required);
        assert!(saw_completed);
    }
}
