//! The orchestrator: sole public entry point of the crate.
//!
//! It owns session bookkeeping, the registry of in-flight human decisions,
//! the append-only audit trail, and the request/response surface. It never
//! advances state on its own initiative — every mutation starts from an
//! explicit, attributed human decision, and payment-gated transitions
//! additionally wait for the external backend's confirmation.
//!
//! Serialization: the tracker and the payment gate manager sit behind
//! `tokio::sync::Mutex`, so concurrent submissions against the same profile
//! queue instead of interleaving the read-then-write of the current state.
//! The park-then-resume window of payment-gated decisions is covered by the
//! tracker's apply-time stale check.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub mod decisions;
pub mod presentation;

pub use decisions::{DecisionGate, DecisionRequest, DecisionStatus};
pub use presentation::{DecisionResult, OptionsPresentation, TransitionOption};

use crate::audit::{
    AUTOMATION_LOCKED, AuditEventType, AuditLogWriter, AuditReport, AuditTrail,
    HUMAN_APPROVAL_REQUIRED, ReportOptions,
};
use crate::config::OrchestratorConfig;
use crate::errors::{OrchestratorError, PaymentError};
use crate::events::{Notification, NotificationHub};
use crate::ids::{IdProvider, UuidProvider};
use crate::payment::{
    PaymentBackend, PaymentConfirmation, PaymentGateManager, PaymentReport, ReferenceBackend,
};
use crate::policy::{EstimatePolicy, StandardPolicy};
use crate::topology::{MaturityState, Topology, TransitionSpec};
use crate::tracker::{ApprovedDecision, MaturityTracker};

/// A logical conversation scope for presenting options and collecting
/// decisions. Created on demand; never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_info: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub status: String,
}

/// Result of [`Orchestrator::start_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStart {
    pub session_id: String,
    pub session: Session,
    pub initial_presentation: OptionsPresentation,
}

/// Point-in-time view of the whole process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub maturity_state: MaturityState,
    pub pending_decisions: usize,
    pub pending_payment_gates: usize,
    pub human_approval_required: bool,
    pub automation_locked: bool,
    pub audit_trail_count: usize,
    pub session_count: usize,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    topology: Arc<Topology>,
    policy: Arc<dyn EstimatePolicy>,
    ids: Arc<dyn IdProvider>,
    hub: NotificationHub,
    audit: AuditTrail,
    tracker: Mutex<MaturityTracker>,
    payments: Mutex<PaymentGateManager>,
    sessions: RwLock<HashMap<String, Session>>,
    /// Pending decision registry. Only `completed` evicts an entry; failed
    /// and rejected attempts stay queryable here.
    decisions: RwLock<HashMap<String, DecisionGate>>,
    completed: RwLock<Vec<DecisionGate>>,
}

impl Orchestrator {
    /// Build with the shipped collaborators: reference payment backend,
    /// standard estimate policy, UUID identifiers.
    pub fn new(config: OrchestratorConfig) -> anyhow::Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(ReferenceBackend),
            Arc::new(StandardPolicy),
            Arc::new(UuidProvider),
        )
    }

    /// Build with injected collaborators.
    pub fn with_collaborators(
        config: OrchestratorConfig,
        backend: Arc<dyn PaymentBackend>,
        policy: Arc<dyn EstimatePolicy>,
        ids: Arc<dyn IdProvider>,
    ) -> anyhow::Result<Self> {
        let topology = Arc::new(Topology::standard());
        if topology.level_info(config.initial_state.level).is_none() {
            bail!(
                "initial state level {} is not part of the topology",
                config.initial_state.level
            );
        }

        let hub = NotificationHub::new(config.notification_capacity);
        let writer = config
            .audit_log_file
            .as_ref()
            .map(|path| AuditLogWriter::new(path.clone()));
        let audit = AuditTrail::new(ids.clone(), writer, hub.clone());
        let tracker = MaturityTracker::new(
            topology.clone(),
            config.initial_state.clone(),
            hub.clone(),
        );
        let payments = PaymentGateManager::new(backend, policy.clone(), ids.clone());

        Ok(Self {
            config,
            topology,
            policy,
            ids,
            hub,
            audit,
            tracker: Mutex::new(tracker),
            payments: Mutex::new(payments),
            sessions: RwLock::new(HashMap::new()),
            decisions: RwLock::new(HashMap::new()),
            completed: RwLock::new(Vec::new()),
        })
    }

    /// Subscribe to the observable notification side channel.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.hub.subscribe()
    }

    /// Open a session and produce the first options presentation. No
    /// transition is implied or selected by starting a session.
    pub async fn start_session(
        &self,
        project_info: serde_json::Value,
    ) -> Result<SessionStart, OrchestratorError> {
        let session = Session {
            id: self.ids.next_id("session"),
            project_info,
            started_at: Utc::now(),
            status: "active".to_string(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        self.audit.append(
            AuditEventType::SessionStarted,
            json!({
                "session_id": session.id,
                "project_info": session.project_info,
            }),
        )?;
        self.hub.publish(Notification::SessionStarted {
            session_id: session.id.clone(),
        });
        info!(session = %session.id, "session started");

        let initial_presentation = self.present_options(&session.id).await?;
        Ok(SessionStart {
            session_id: session.id.clone(),
            session,
            initial_presentation,
        })
    }

    /// Present the legal transitions from the current state, partitioned
    /// into payment-free and payment-gated buckets.
    pub async fn present_options(
        &self,
        session_id: &str,
    ) -> Result<OptionsPresentation, OrchestratorError> {
        self.require_session(session_id).await?;
        let current = self.tracker.lock().await.current_state();
        let presentation = self.build_presentation(session_id, &current);

        self.audit.append(
            AuditEventType::OptionsPresented,
            json!({
                "session_id": session_id,
                "level": current.level,
                "checkpoint": current.checkpoint,
                "option_count": presentation.option_count(),
            }),
        )?;
        self.hub.publish(Notification::DecisionRequired {
            session_id: session_id.to_string(),
            option_count: presentation.option_count(),
        });
        Ok(presentation)
    }

    /// Process one explicit human decision.
    ///
    /// Field validation fails fast with no registry or state mutation. A
    /// topology rejection records the attempt as `rejected`. A payment-gated
    /// transition parks as `awaiting_payment` and returns the gate
    /// presentation; an ungated one executes immediately.
    pub async fn submit_decision(
        &self,
        session_id: &str,
        decision: DecisionRequest,
    ) -> Result<DecisionResult, OrchestratorError> {
        self.require_session(session_id).await?;

        if let Err(reason) = validate_decision(&decision) {
            self.audit.append(
                AuditEventType::DecisionRejected,
                json!({
                    "session_id": session_id,
                    "selected_transition": decision.selected_transition,
                    "reason": reason,
                }),
            )?;
            return Err(OrchestratorError::InvalidDecision { reason });
        }

        // Hold the tracker for the whole validate-then-execute window.
        let mut tracker = self.tracker.lock().await;
        let current = tracker.current_state();

        let mut gate = DecisionGate::new(
            self.ids.next_id("decision"),
            session_id.to_string(),
            decision.clone(),
            self.config.decision_expiry.map(|ttl| Utc::now() + ttl),
        );
        self.store_decision(gate.clone()).await;
        self.audit.append(
            AuditEventType::DecisionSubmitted,
            json!({
                "session_id": session_id,
                "decision_id": gate.id,
                "selected_transition": decision.selected_transition,
                "authorized_by": decision.authorized_by,
            }),
        )?;

        let transition = match self
            .topology
            .validate_transition(&current, &decision.selected_transition)
        {
            Ok(transition) => transition,
            Err(err) => {
                let reason = err.to_string();
                gate.advance(DecisionStatus::Rejected);
                gate.error = Some(reason.clone());
                self.store_decision(gate.clone()).await;
                self.audit.append(
                    AuditEventType::DecisionRejected,
                    json!({
                        "session_id": session_id,
                        "decision_id": gate.id,
                        "reason": reason,
                    }),
                )?;
                return Err(OrchestratorError::InvalidTransition { reason });
            }
        };

        if transition.requires_payment_gate {
            let (payment_gate, gate_view) = {
                let mut payments = self.payments.lock().await;
                let payment_gate = payments.create_gate(&transition);
                let gate_view = payments.present_gate(&payment_gate.id)?;
                (payment_gate, gate_view)
            };
            gate.payment_gate_id = Some(payment_gate.id.clone());
            gate.advance(DecisionStatus::AwaitingPayment);
            self.store_decision(gate.clone()).await;

            self.audit.append(
                AuditEventType::PaymentGateCreated,
                json!({
                    "session_id": session_id,
                    "decision_id": gate.id,
                    "payment_gate_id": payment_gate.id,
                    "transition_id": transition.id,
                    "amount_estimate": payment_gate.amount_estimate,
                }),
            )?;
            self.hub.publish(Notification::PaymentRequired {
                session_id: session_id.to_string(),
                decision_id: gate.id.clone(),
                payment_gate_id: payment_gate.id.clone(),
            });
            info!(
                decision = %gate.id,
                payment_gate = %payment_gate.id,
                "decision parked awaiting payment confirmation"
            );

            return Ok(DecisionResult {
                decision_id: gate.id,
                status: DecisionStatus::AwaitingPayment,
                new_state: None,
                payment_gate: Some(gate_view),
                next_options: None,
            });
        }

        self.execute(&mut tracker, gate).await
    }

    /// Forward a payment confirmation to the gate manager and, on approval,
    /// execute the parked decision.
    pub async fn confirm_payment(
        &self,
        session_id: &str,
        decision_id: &str,
        confirmation: PaymentConfirmation,
    ) -> Result<DecisionResult, OrchestratorError> {
        self.require_session(session_id).await?;

        let mut tracker = self.tracker.lock().await;

        let gate = self.decisions.read().await.get(decision_id).cloned();
        let Some(mut gate) = gate.filter(|g| g.session_id == session_id) else {
            self.audit.append(
                AuditEventType::RequestRejected,
                json!({
                    "session_id": session_id,
                    "decision_id": decision_id,
                    "reason": "unknown decision",
                }),
            )?;
            return Err(OrchestratorError::UnknownDecision {
                decision_id: decision_id.to_string(),
            });
        };
        let Some(payment_gate_id) = gate.payment_gate_id.clone() else {
            self.audit.append(
                AuditEventType::RequestRejected,
                json!({
                    "session_id": session_id,
                    "decision_id": decision_id,
                    "reason": "decision has no payment gate",
                }),
            )?;
            return Err(OrchestratorError::NoPaymentGate {
                decision_id: decision_id.to_string(),
            });
        };

        let backend_decision = {
            let mut payments = self.payments.lock().await;
            payments.confirm(&payment_gate_id, &confirmation).await
        };
        let backend_decision = match backend_decision {
            Ok(decision) => decision,
            Err(err) => {
                self.audit.append(
                    AuditEventType::PaymentConfirmationProcessed,
                    json!({
                        "session_id": session_id,
                        "decision_id": decision_id,
                        "payment_gate_id": payment_gate_id,
                        "outcome": "error",
                        "reason": err.to_string(),
                    }),
                )?;
                return Err(match err {
                    PaymentError::AlreadyResolved { gate_id, status } => {
                        OrchestratorError::PaymentGateConflict { gate_id, status }
                    }
                    other => other.into(),
                });
            }
        };

        self.audit.append(
            AuditEventType::PaymentConfirmationProcessed,
            json!({
                "session_id": session_id,
                "decision_id": decision_id,
                "payment_gate_id": payment_gate_id,
                "approved": backend_decision.approved,
                "transaction_reference": backend_decision.transaction_reference,
            }),
        )?;
        self.hub.publish(Notification::PaymentConfirmationProcessed {
            decision_id: decision_id.to_string(),
            payment_gate_id: payment_gate_id.clone(),
            approved: backend_decision.approved,
        });

        if backend_decision.approved {
            gate.payment_confirmed = true;
            return self.execute(&mut tracker, gate).await;
        }

        let reason = backend_decision
            .reason
            .unwrap_or_else(|| "payment rejected by backend".to_string());
        gate.advance(DecisionStatus::PaymentRejected);
        gate.error = Some(reason.clone());
        // Kept in the registry for audit visibility; never retried here.
        self.store_decision(gate).await;
        self.audit.append(
            AuditEventType::PaymentRejected,
            json!({
                "session_id": session_id,
                "decision_id": decision_id,
                "payment_gate_id": payment_gate_id,
                "reason": reason,
            }),
        )?;
        warn!(decision = decision_id, "payment rejected");
        Err(OrchestratorError::PaymentRejected { reason })
    }

    /// Abandon a decision parked before execution. Once execution has
    /// begun the attempt runs to a terminal outcome and is not cancellable.
    pub async fn cancel_decision(
        &self,
        session_id: &str,
        decision_id: &str,
        cancelled_by: &str,
    ) -> Result<DecisionGate, OrchestratorError> {
        self.require_session(session_id).await?;

        let mut decisions = self.decisions.write().await;
        let Some(gate) = decisions
            .get_mut(decision_id)
            .filter(|g| g.session_id == session_id)
        else {
            self.audit.append(
                AuditEventType::RequestRejected,
                json!({
                    "session_id": session_id,
                    "decision_id": decision_id,
                    "reason": "unknown decision",
                }),
            )?;
            return Err(OrchestratorError::UnknownDecision {
                decision_id: decision_id.to_string(),
            });
        };
        if gate.status != DecisionStatus::AwaitingPayment {
            let status = gate.status.as_str().to_string();
            self.audit.append(
                AuditEventType::RequestRejected,
                json!({
                    "session_id": session_id,
                    "decision_id": decision_id,
                    "reason": format!("decision is {status}, not cancellable"),
                }),
            )?;
            return Err(OrchestratorError::NotCancellable {
                decision_id: decision_id.to_string(),
                status,
            });
        }

        gate.advance(DecisionStatus::Failed);
        gate.error = Some(format!("cancelled by {cancelled_by}"));
        if let Some(payment_gate_id) = gate.payment_gate_id.clone() {
            self.payments.lock().await.abandon_gate(&payment_gate_id)?;
        }
        self.audit.append(
            AuditEventType::DecisionCancelled,
            json!({
                "session_id": session_id,
                "decision_id": decision_id,
                "payment_gate_id": gate.payment_gate_id,
                "cancelled_by": cancelled_by,
            }),
        )?;
        info!(decision = decision_id, by = cancelled_by, "decision cancelled");
        Ok(gate.clone())
    }

    /// Fail every parked decision past its deadline and abandon its payment
    /// gate. Caller-driven; a no-op unless `decision_expiry` is configured.
    /// Returns the expired decision ids.
    pub async fn sweep_expired_decisions(&self) -> Result<Vec<String>, OrchestratorError> {
        let now = Utc::now();
        let mut expired = Vec::new();
        let mut decisions = self.decisions.write().await;
        for gate in decisions.values_mut() {
            let past_deadline = gate.status == DecisionStatus::AwaitingPayment
                && gate.expires_at.is_some_and(|deadline| deadline <= now);
            if !past_deadline {
                continue;
            }
            gate.advance(DecisionStatus::Failed);
            gate.error = Some("expired awaiting payment confirmation".to_string());
            if let Some(payment_gate_id) = gate.payment_gate_id.clone() {
                self.payments.lock().await.abandon_gate(&payment_gate_id)?;
            }
            self.audit.append(
                AuditEventType::DecisionExpired,
                json!({
                    "session_id": gate.session_id,
                    "decision_id": gate.id,
                    "payment_gate_id": gate.payment_gate_id,
                }),
            )?;
            warn!(decision = %gate.id, "decision expired awaiting payment");
            expired.push(gate.id.clone());
        }
        Ok(expired)
    }

    /// Point-in-time process snapshot. The compliance flags come straight
    /// from the compile-time constants.
    pub async fn get_status(&self) -> StatusSnapshot {
        let maturity_state = self.tracker.lock().await.current_state();
        let pending_decisions = {
            let decisions = self.decisions.read().await;
            decisions.values().filter(|g| !g.status.is_terminal()).count()
        };
        let pending_payment_gates = self.payments.lock().await.pending_gates().len();
        StatusSnapshot {
            maturity_state,
            pending_decisions,
            pending_payment_gates,
            human_approval_required: HUMAN_APPROVAL_REQUIRED,
            automation_locked: AUTOMATION_LOCKED,
            audit_trail_count: self.audit.len(),
            session_count: self.sessions.read().await.len(),
        }
    }

    /// Aggregated audit view; optionally carries the full trail.
    pub async fn audit_report(&self, options: ReportOptions) -> AuditReport {
        let (pending_decisions, failed_decisions) = {
            let decisions = self.decisions.read().await;
            let pending = decisions.values().filter(|g| !g.status.is_terminal()).count();
            let failed = decisions
                .values()
                .filter(|g| {
                    matches!(
                        g.status,
                        DecisionStatus::Failed
                            | DecisionStatus::Rejected
                            | DecisionStatus::PaymentRejected
                    )
                })
                .count();
            (pending, failed)
        };
        AuditReport {
            generated_at: Utc::now(),
            total_entries: self.audit.len(),
            pending_decisions,
            completed_decisions: self.completed.read().await.len(),
            failed_decisions,
            pending_payment_gates: self.payments.lock().await.pending_gates().len(),
            human_approval_required: HUMAN_APPROVAL_REQUIRED,
            automation_locked: AUTOMATION_LOCKED,
            entries: options.include_full_trail.then(|| self.audit.entries()),
        }
    }

    /// Aggregated payment gate view.
    pub async fn payment_report(&self) -> PaymentReport {
        self.payments.lock().await.payment_report()
    }

    /// Look up one decision, pending or archived.
    pub async fn decision(&self, decision_id: &str) -> Option<DecisionGate> {
        if let Some(gate) = self.decisions.read().await.get(decision_id) {
            return Some(gate.clone());
        }
        self.completed
            .read()
            .await
            .iter()
            .find(|g| g.id == decision_id)
            .cloned()
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Snapshot of the pending decision registry.
    pub async fn pending_decisions(&self) -> Vec<DecisionGate> {
        self.decisions.read().await.values().cloned().collect()
    }

    /// Convenience read of the tracker's current state.
    pub async fn current_state(&self) -> MaturityState {
        self.tracker.lock().await.current_state()
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Shared execution step for the direct and post-payment paths. Runs to
    /// a terminal outcome: `completed` evicts the gate into the archive,
    /// `failed` keeps it in the registry for inspection.
    async fn execute(
        &self,
        tracker: &mut MaturityTracker,
        mut gate: DecisionGate,
    ) -> Result<DecisionResult, OrchestratorError> {
        gate.advance(DecisionStatus::Executing);
        self.store_decision(gate.clone()).await;

        let approved = ApprovedDecision {
            transition_id: &gate.decision.selected_transition,
            justification: &gate.decision.justification,
            authorized_by: &gate.decision.authorized_by,
            payment_confirmed: gate.payment_confirmed,
            session_id: &gate.session_id,
            decision_id: &gate.id,
        };

        match tracker.apply_transition(&approved) {
            Ok(new_state) => {
                gate.advance(DecisionStatus::Completed);
                self.decisions.write().await.remove(&gate.id);
                self.audit.append(
                    AuditEventType::StateTransitionCompleted,
                    json!({
                        "session_id": gate.session_id,
                        "decision_id": gate.id,
                        "transition_id": gate.decision.selected_transition,
                        "level": new_state.level,
                        "checkpoint": new_state.checkpoint,
                        "payment_confirmed": gate.payment_confirmed,
                    }),
                )?;

                let next_options = self.build_presentation(&gate.session_id, &new_state);
                let decision_id = gate.id.clone();
                self.completed.write().await.push(gate);

                Ok(DecisionResult {
                    decision_id,
                    status: DecisionStatus::Completed,
                    new_state: Some(new_state),
                    payment_gate: None,
                    next_options: Some(next_options),
                })
            }
            Err(err) => {
                let reason = err.to_string();
                gate.advance(DecisionStatus::Failed);
                gate.error = Some(reason.clone());
                self.audit.append(
                    AuditEventType::TransitionFailed,
                    json!({
                        "session_id": gate.session_id,
                        "decision_id": gate.id,
                        "transition_id": gate.decision.selected_transition,
                        "reason": reason,
                    }),
                )?;
                warn!(decision = %gate.id, %reason, "transition failed");
                self.store_decision(gate).await;
                Err(err.into())
            }
        }
    }

    fn build_presentation(
        &self,
        session_id: &str,
        current: &MaturityState,
    ) -> OptionsPresentation {
        let mut without_payment = Vec::new();
        let mut with_payment = Vec::new();
        for transition in self.topology.transitions_from(current) {
            let option = TransitionOption {
                transition_id: transition.id.clone(),
                description: transition.describe(),
                target_level: transition.to.level,
                target_checkpoint: transition.to.checkpoint,
                kind: transition.kind,
                requirements: self.requirements_for(transition),
                risk: self.policy.risk(transition),
                effort_estimate: self.policy.effort_estimate(transition),
                amount_estimate: transition
                    .requires_payment_gate
                    .then(|| self.policy.amount_estimate(transition)),
            };
            if transition.requires_payment_gate {
                with_payment.push(option);
            } else {
                without_payment.push(option);
            }
        }
        OptionsPresentation {
            session_id: session_id.to_string(),
            current_state: current.clone(),
            current_level_name: self
                .topology
                .level_info(current.level)
                .map(|info| info.name.clone())
                .unwrap_or_default(),
            without_payment,
            with_payment,
            generated_at: Utc::now(),
        }
    }

    fn requirements_for(&self, transition: &TransitionSpec) -> Vec<String> {
        let mut requirements =
            vec!["Written justification from the approving owner".to_string()];
        if let Some(info) = self.topology.level_info(transition.to.level) {
            requirements.push(format!(
                "Level {} ({}) entry criteria reviewed",
                info.level, info.name
            ));
        }
        let checkpoint = self.topology.checkpoint_info(transition.to.checkpoint);
        requirements.push(format!("{}: {}", checkpoint.name, checkpoint.description));
        if transition.requires_payment_gate {
            requirements
                .push("Payment confirmed through the external backend".to_string());
        }
        requirements
    }

    async fn require_session(&self, session_id: &str) -> Result<(), OrchestratorError> {
        if self.sessions.read().await.contains_key(session_id) {
            return Ok(());
        }
        self.audit.append(
            AuditEventType::RequestRejected,
            json!({
                "session_id": session_id,
                "reason": "unknown session",
            }),
        )?;
        Err(OrchestratorError::UnknownSession {
            session_id: session_id.to_string(),
        })
    }

    async fn store_decision(&self, gate: DecisionGate) {
        self.decisions.write().await.insert(gate.id.clone(), gate);
    }
}

fn validate_decision(decision: &DecisionRequest) -> Result<(), String> {
    if decision.selected_transition.trim().is_empty() {
        return Err("selectedTransition is required".to_string());
    }
    if decision.justification.trim().is_empty() {
        return Err("justification is required".to_string());
    }
    if decision.authorized_by.trim().is_empty() {
        return Err("authorizedBy must identify the approving human".to_string());
    }
    Ok(())
}
