//! Payment gate lifecycle, independent of any particular decision.
//!
//! A gate is created for exactly one transition attempt, presented to the
//! approving human, and resolved exactly once. The approval decision itself
//! belongs to the external payment backend; this module only validates the
//! gate lifecycle and records the outcome.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::PaymentError;
use crate::ids::IdProvider;
use crate::policy::EstimatePolicy;
use crate::topology::{StatePosition, TransitionKind, TransitionSpec};

pub mod callback;
pub use callback::{ConfirmationListener, GateConfirmation};

/// Resolution state of one payment gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Approved,
    Rejected,
    Abandoned,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Abandoned => "abandoned",
        }
    }
}

impl FromStr for ConfirmationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("Invalid confirmation status: {}", s)),
        }
    }
}

/// Lifecycle record of one required external payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGate {
    pub id: String,
    pub transition_id: String,
    pub kind: TransitionKind,
    pub from: StatePosition,
    pub to: StatePosition,
    pub amount_estimate: String,
    pub confirmation_status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
}

impl PaymentGate {
    pub fn is_resolved(&self) -> bool {
        self.confirmation_status != ConfirmationStatus::Pending
    }
}

/// Confirmation document submitted on behalf of the payment backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub confirmed: bool,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// What the backend decided about one confirmation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendDecision {
    pub approved: bool,
    #[serde(default)]
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The external payment collaborator. Opaque to this crate; implementations
/// decide, this crate records.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn confirm(
        &self,
        gate: &PaymentGate,
        confirmation: &PaymentConfirmation,
    ) -> anyhow::Result<BackendDecision>;
}

/// Backend that trusts the confirmation document it is handed: approves when
/// the document is flagged confirmed and carries a transaction reference,
/// rejects with a reason otherwise.
///
/// Concrete processor integration is out of scope; this is the seam a real
/// integration plugs into.
#[derive(Debug, Default)]
pub struct ReferenceBackend;

#[async_trait]
impl PaymentBackend for ReferenceBackend {
    async fn confirm(
        &self,
        _gate: &PaymentGate,
        confirmation: &PaymentConfirmation,
    ) -> anyhow::Result<BackendDecision> {
        if !confirmation.confirmed {
            return Ok(BackendDecision {
                approved: false,
                transaction_reference: None,
                reason: Some("confirmation document not flagged as confirmed".to_string()),
            });
        }
        match confirmation.transaction_reference.as_deref() {
            Some(reference) if !reference.trim().is_empty() => Ok(BackendDecision {
                approved: true,
                transaction_reference: Some(reference.to_string()),
                reason: None,
            }),
            _ => Ok(BackendDecision {
                approved: false,
                transaction_reference: None,
                reason: Some("confirmation carries no transaction reference".to_string()),
            }),
        }
    }
}

/// Human-facing view of one gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatePresentation {
    pub gate_id: String,
    pub transition_id: String,
    pub amount_estimate: String,
    pub blocks: String,
    pub instructions: String,
    pub status: ConfirmationStatus,
}

/// Aggregated gate view for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReport {
    pub generated_at: DateTime<Utc>,
    pub total_gates: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub abandoned: usize,
    pub gates: Vec<PaymentGate>,
}

/// Creates, tracks, and resolves payment gates.
pub struct PaymentGateManager {
    gates: HashMap<String, PaymentGate>,
    /// Gate ids in creation order, for stable reporting.
    created: Vec<String>,
    backend: Arc<dyn PaymentBackend>,
    policy: Arc<dyn EstimatePolicy>,
    ids: Arc<dyn IdProvider>,
}

impl PaymentGateManager {
    pub fn new(
        backend: Arc<dyn PaymentBackend>,
        policy: Arc<dyn EstimatePolicy>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            gates: HashMap::new(),
            created: Vec::new(),
            backend,
            policy,
            ids,
        }
    }

    /// Create a fresh pending gate for the given transition.
    pub fn create_gate(&mut self, transition: &TransitionSpec) -> PaymentGate {
        let gate = PaymentGate {
            id: self.ids.next_id("gate"),
            transition_id: transition.id.clone(),
            kind: transition.kind,
            from: transition.from,
            to: transition.to,
            amount_estimate: self.policy.amount_estimate(transition),
            confirmation_status: ConfirmationStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            transaction_reference: None,
        };
        debug!(gate = %gate.id, transition = %gate.transition_id, "payment gate created");
        self.created.push(gate.id.clone());
        self.gates.insert(gate.id.clone(), gate.clone());
        gate
    }

    pub fn gate(&self, gate_id: &str) -> Option<&PaymentGate> {
        self.gates.get(gate_id)
    }

    pub fn present_gate(&self, gate_id: &str) -> Result<PaymentGatePresentation, PaymentError> {
        let gate = self.gates.get(gate_id).ok_or_else(|| PaymentError::UnknownGate {
            gate_id: gate_id.to_string(),
        })?;
        Ok(PaymentGatePresentation {
            gate_id: gate.id.clone(),
            transition_id: gate.transition_id.clone(),
            amount_estimate: gate.amount_estimate.clone(),
            blocks: format!(
                "{} {} (from {})",
                gate.kind, gate.transition_id, gate.from
            ),
            instructions: format!(
                "Transition {} is blocked until the external payment backend confirms a \
                 transaction in the {} range. Submit the backend's confirmation to resolve \
                 this gate.",
                gate.transition_id, gate.amount_estimate
            ),
            status: gate.confirmation_status,
        })
    }

    /// Resolve a gate exactly once.
    ///
    /// The gate must exist and still be pending; the approval decision is
    /// delegated to the backend and its terminal outcome recorded. A second
    /// confirmation attempt fails with a conflict and leaves the first
    /// resolution intact.
    pub async fn confirm(
        &mut self,
        gate_id: &str,
        confirmation: &PaymentConfirmation,
    ) -> Result<BackendDecision, PaymentError> {
        let snapshot = match self.gates.get(gate_id) {
            Some(gate) => gate.clone(),
            None => {
                return Err(PaymentError::UnknownGate {
                    gate_id: gate_id.to_string(),
                });
            }
        };
        if snapshot.is_resolved() {
            return Err(PaymentError::AlreadyResolved {
                gate_id: gate_id.to_string(),
                status: snapshot.confirmation_status.as_str().to_string(),
            });
        }

        let decision = self
            .backend
            .confirm(&snapshot, confirmation)
            .await
            .map_err(PaymentError::Backend)?;

        if let Some(gate) = self.gates.get_mut(gate_id) {
            gate.confirmation_status = if decision.approved {
                ConfirmationStatus::Approved
            } else {
                ConfirmationStatus::Rejected
            };
            gate.resolved_at = Some(Utc::now());
            gate.transaction_reference = decision.transaction_reference.clone();
        }
        info!(
            gate = gate_id,
            approved = decision.approved,
            "payment confirmation processed"
        );
        Ok(decision)
    }

    /// Mark an unresolved gate abandoned (cancellation and expiry paths).
    pub fn abandon_gate(&mut self, gate_id: &str) -> Result<(), PaymentError> {
        let gate = self.gates.get_mut(gate_id).ok_or_else(|| PaymentError::UnknownGate {
            gate_id: gate_id.to_string(),
        })?;
        if gate.is_resolved() {
            return Err(PaymentError::AlreadyResolved {
                gate_id: gate_id.to_string(),
                status: gate.confirmation_status.as_str().to_string(),
            });
        }
        gate.confirmation_status = ConfirmationStatus::Abandoned;
        gate.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Unresolved gates in creation order.
    pub fn pending_gates(&self) -> Vec<&PaymentGate> {
        self.created
            .iter()
            .filter_map(|id| self.gates.get(id))
            .filter(|gate| !gate.is_resolved())
            .collect()
    }

    pub fn payment_report(&self) -> PaymentReport {
        let gates: Vec<PaymentGate> = self
            .created
            .iter()
            .filter_map(|id| self.gates.get(id).cloned())
            .collect();
        let count = |status: ConfirmationStatus| {
            gates
                .iter()
                .filter(|g| g.confirmation_status == status)
                .count()
        };
        PaymentReport {
            generated_at: Utc::now(),
            total_gates: gates.len(),
            pending: count(ConfirmationStatus::Pending),
            approved: count(ConfirmationStatus::Approved),
            rejected: count(ConfirmationStatus::Rejected),
            abandoned: count(ConfirmationStatus::Abandoned),
            gates,
        }
    }
}
