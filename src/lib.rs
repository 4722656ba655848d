//! ascent — human-gated maturity orchestrator.
//!
//! A tracked profile advances through ordered maturity levels and
//! checkpoints. Every transition requires an explicit, audited human
//! approval; budget-gated upgrades additionally require confirmed payment
//! through an external backend before they may execute. The orchestrator
//! only ever validates and forwards authorized human input — nothing in
//! this crate advances state autonomously.

pub mod audit;
pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod orchestrator;
pub mod payment;
pub mod policy;
pub mod topology;
pub mod tracker;

pub use audit::{AUTOMATION_LOCKED, HUMAN_APPROVAL_REQUIRED};
pub use config::OrchestratorConfig;
pub use errors::{OrchestratorError, PaymentError, TopologyError, TrackerError};
pub use orchestrator::{DecisionRequest, DecisionStatus, Orchestrator};
pub use topology::{Checkpoint, MaturityState, Topology};
