use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Human decision payload submitted against a session. All three fields are
/// required; `authorized_by` names the approving human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub selected_transition: String,
    pub justification: String,
    pub authorized_by: String,
}

/// Lifecycle status of one transition attempt.
///
/// `processing → {rejected | awaiting_payment | executing}`;
/// `awaiting_payment → {executing | payment_rejected | failed}`
/// (`failed` via cancellation or expiry);
/// `executing → {completed | failed}`.
/// Terminal states end the attempt — recovery is a fresh submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Processing,
    AwaitingPayment,
    Executing,
    Completed,
    Failed,
    Rejected,
    PaymentRejected,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::PaymentRejected => "payment_rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Rejected | Self::PaymentRejected
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn may_become(&self, next: DecisionStatus) -> bool {
        use DecisionStatus::*;
        matches!(
            (self, next),
            (Processing, Rejected)
                | (Processing, AwaitingPayment)
                | (Processing, Executing)
                | (AwaitingPayment, Executing)
                | (AwaitingPayment, PaymentRejected)
                | (AwaitingPayment, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }
}

impl FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "rejected" => Ok(Self::Rejected),
            "payment_rejected" => Ok(Self::PaymentRejected),
            _ => Err(format!("Invalid decision status: {}", s)),
        }
    }
}

/// Lifecycle record of one human-submitted transition attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionGate {
    pub id: String,
    pub session_id: String,
    pub submitted_at: DateTime<Utc>,
    pub decision: DecisionRequest,
    pub status: DecisionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_gate_id: Option<String>,
    pub payment_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl DecisionGate {
    pub fn new(
        id: String,
        session_id: String,
        decision: DecisionRequest,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            session_id,
            submitted_at: Utc::now(),
            decision,
            status: DecisionStatus::Processing,
            payment_gate_id: None,
            payment_confirmed: false,
            error: None,
            expires_at,
        }
    }

    /// Move to the next lifecycle status. Callers stay within the machine;
    /// the assertion catches a slipped invariant in debug builds.
    pub(crate) fn advance(&mut self, next: DecisionStatus) {
        debug_assert!(
            self.status.may_become(next),
            "illegal decision status move {} -> {}",
            self.status.as_str(),
            next.as_str()
        );
        self.status = next;
    }
}
