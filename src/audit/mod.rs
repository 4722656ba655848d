//! Append-only audit trail.
//!
//! The trail is the sole source of truth for what happened and when. Entries
//! are never mutated or deleted; the sequence number is assigned from a
//! process-monotonic counter so causally-related entries within one session
//! never reorder, and appends are safe under concurrency.

use std::str::FromStr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{Notification, NotificationHub};
use crate::ids::IdProvider;

pub mod logger;
pub use logger::AuditLogWriter;

/// Every transition in this process requires an explicit human approval.
/// Fixed at compile time; no operation can flip it.
pub const HUMAN_APPROVAL_REQUIRED: bool = true;
/// No transition in this process ever executes autonomously.
/// Fixed at compile time; no operation can flip it.
pub const AUTOMATION_LOCKED: bool = true;

/// Classification of one audited event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionStarted,
    OptionsPresented,
    DecisionSubmitted,
    DecisionRejected,
    PaymentGateCreated,
    PaymentConfirmationProcessed,
    PaymentRejected,
    StateTransitionCompleted,
    TransitionFailed,
    DecisionCancelled,
    DecisionExpired,
    RequestRejected,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::OptionsPresented => "options_presented",
            Self::DecisionSubmitted => "decision_submitted",
            Self::DecisionRejected => "decision_rejected",
            Self::PaymentGateCreated => "payment_gate_created",
            Self::PaymentConfirmationProcessed => "payment_confirmation_processed",
            Self::PaymentRejected => "payment_rejected",
            Self::StateTransitionCompleted => "state_transition_completed",
            Self::TransitionFailed => "transition_failed",
            Self::DecisionCancelled => "decision_cancelled",
            Self::DecisionExpired => "decision_expired",
            Self::RequestRejected => "request_rejected",
        }
    }
}

impl FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session_started" => Ok(Self::SessionStarted),
            "options_presented" => Ok(Self::OptionsPresented),
            "decision_submitted" => Ok(Self::DecisionSubmitted),
            "decision_rejected" => Ok(Self::DecisionRejected),
            "payment_gate_created" => Ok(Self::PaymentGateCreated),
            "payment_confirmation_processed" => Ok(Self::PaymentConfirmationProcessed),
            "payment_rejected" => Ok(Self::PaymentRejected),
            "state_transition_completed" => Ok(Self::StateTransitionCompleted),
            "transition_failed" => Ok(Self::TransitionFailed),
            "decision_cancelled" => Ok(Self::DecisionCancelled),
            "decision_expired" => Ok(Self::DecisionExpired),
            "request_rejected" => Ok(Self::RequestRejected),
            _ => Err(format!("Invalid audit event type: {}", s)),
        }
    }
}

/// Process compliance constants echoed into every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub human_approval_required: bool,
    pub automation_locked: bool,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            human_approval_required: HUMAN_APPROVAL_REQUIRED,
            automation_locked: AUTOMATION_LOCKED,
        }
    }
}

/// Immutable record of one meaningful event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Process-monotonic ordering, independent of wall clock.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub data: Value,
    pub system_info: SystemInfo,
}

/// In-memory append-only log, optionally mirrored line-by-line to a file.
pub struct AuditTrail {
    entries: RwLock<Vec<AuditEntry>>,
    seq: AtomicU64,
    ids: Arc<dyn IdProvider>,
    writer: Option<AuditLogWriter>,
    hub: NotificationHub,
}

impl AuditTrail {
    pub fn new(
        ids: Arc<dyn IdProvider>,
        writer: Option<AuditLogWriter>,
        hub: NotificationHub,
    ) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            ids,
            writer,
            hub,
        }
    }

    /// Append one entry. The entry is stamped, stored, mirrored to the file
    /// writer if one is configured, and announced on the hub. A file write
    /// failure is propagated — audit loss is never silent.
    ///
    /// Stamping and insertion happen under one lock so `seq` order and
    /// storage order (memory and file) always agree.
    pub fn append(&self, event_type: AuditEventType, data: Value) -> Result<AuditEntry> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = AuditEntry {
            id: self.ids.next_id("audit"),
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            event_type,
            data,
            system_info: SystemInfo::default(),
        };
        if let Some(writer) = &self.writer {
            writer.append(&entry)?;
        }
        entries.push(entry.clone());
        drop(entries);
        self.hub.publish(Notification::AuditEvent {
            entry_id: entry.id.clone(),
            event_type: event_type.as_str().to_string(),
        });
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the full trail.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count_of(&self, event_type: AuditEventType) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

/// Options for [`AuditReport`] generation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReportOptions {
    #[serde(default)]
    pub include_full_trail: bool,
}

/// Aggregated audit view. Always reports the compliance constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub total_entries: usize,
    pub pending_decisions: usize,
    pub completed_decisions: usize,
    pub failed_decisions: usize,
    pub pending_payment_gates: usize,
    pub human_approval_required: bool,
    pub automation_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<AuditEntry>>,
}
