//! View types handed to the approving human. Presentations describe and
//! never recommend: options appear in topology insertion order, unranked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decisions::DecisionStatus;
use crate::payment::PaymentGatePresentation;
use crate::policy::RiskLevel;
use crate::topology::{Checkpoint, MaturityState, TransitionKind};

/// One selectable transition, annotated for human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOption {
    pub transition_id: String,
    pub description: String,
    pub target_level: u8,
    pub target_checkpoint: Checkpoint,
    pub kind: TransitionKind,
    pub requirements: Vec<String>,
    pub risk: RiskLevel,
    pub effort_estimate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_estimate: Option<String>,
}

/// The full options view for one session, partitioned by payment gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsPresentation {
    pub session_id: String,
    pub current_state: MaturityState,
    pub current_level_name: String,
    pub without_payment: Vec<TransitionOption>,
    pub with_payment: Vec<TransitionOption>,
    pub generated_at: DateTime<Utc>,
}

impl OptionsPresentation {
    pub fn option_count(&self) -> usize {
        self.without_payment.len() + self.with_payment.len()
    }
}

/// Outcome of a decision submission or payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision_id: String,
    pub status: DecisionStatus,
    /// Set once the transition has executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<MaturityState>,
    /// Set when the decision is parked on a payment gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_gate: Option<PaymentGatePresentation>,
    /// Fresh options reflecting the new state, after completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_options: Option<OptionsPresentation>,
}
