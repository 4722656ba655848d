//! Pluggable presentation estimates.
//!
//! Amount, effort, and risk figures are policy, not contract: the trait
//! guarantees only that each figure is a deterministic function of the
//! transition spec. Swap the policy to change the numbers without touching
//! the managers.

use serde::{Deserialize, Serialize};

use crate::topology::{TransitionKind, TransitionSpec};

/// Coarse risk classification attached to presented options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
        }
    }
}

/// Deterministic estimates for one transition.
pub trait EstimatePolicy: Send + Sync {
    fn amount_estimate(&self, transition: &TransitionSpec) -> String;
    fn effort_estimate(&self, transition: &TransitionSpec) -> String;
    fn risk(&self, transition: &TransitionSpec) -> RiskLevel;
}

/// Default bands: amount by target level, effort by kind, rollbacks rated
/// medium risk.
#[derive(Debug, Default)]
pub struct StandardPolicy;

impl EstimatePolicy for StandardPolicy {
    fn amount_estimate(&self, transition: &TransitionSpec) -> String {
        let band = match transition.to.level {
            2 => "$5,000–$50,000",
            3 => "$50,000–$250,000",
            4 => "$250,000–$1,000,000",
            5 => "$1,000,000+",
            _ => "$0",
        };
        band.to_string()
    }

    fn effort_estimate(&self, transition: &TransitionSpec) -> String {
        let effort = match transition.kind {
            TransitionKind::Advance => "2-4 weeks",
            TransitionKind::Upgrade => "4-8 weeks",
            TransitionKind::Rollback => "1-2 weeks",
        };
        effort.to_string()
    }

    fn risk(&self, transition: &TransitionSpec) -> RiskLevel {
        match transition.kind {
            TransitionKind::Rollback => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}
