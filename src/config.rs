use std::path::PathBuf;

use chrono::Duration;

use crate::topology::MaturityState;

/// Runtime configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// State the tracked profile starts in.
    pub initial_state: MaturityState,
    /// Optional deadline for decisions parked on a payment gate. Parked
    /// decisions never time out on their own; callers opt in and drive
    /// [`crate::orchestrator::Orchestrator::sweep_expired_decisions`].
    pub decision_expiry: Option<Duration>,
    /// Optional JSONL file every audit entry is mirrored to.
    pub audit_log_file: Option<PathBuf>,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            initial_state: MaturityState::initial(),
            decision_expiry: None,
            audit_log_file: None,
            notification_capacity: 256,
        }
    }
}
