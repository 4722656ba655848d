//! Static maturity topology: levels, checkpoints, and the legal transitions
//! between them.
//!
//! The topology is a read-only oracle. Legality is defined by a fixed graph
//! built once in [`Topology::standard`]: each state has an enumerable set of
//! outbound transitions and nothing learns new edges at runtime. Validation
//! is a pure lookup with no side effects.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::TopologyError;

/// Lowest maturity level in the standard topology.
pub const MIN_LEVEL: u8 = 1;
/// Highest maturity level in the standard topology.
pub const MAX_LEVEL: u8 = 5;

/// Ordered checkpoint within a maturity level. A < B < C.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Checkpoint {
    A,
    B,
    C,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// The next checkpoint up, if any.
    pub fn next(&self) -> Option<Checkpoint> {
        match self {
            Self::A => Some(Self::B),
            Self::B => Some(Self::C),
            Self::C => None,
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Checkpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            _ => Err(format!("Invalid checkpoint: {}", s)),
        }
    }
}

/// A level/checkpoint coordinate in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatePosition {
    pub level: u8,
    pub checkpoint: Checkpoint,
}

impl StatePosition {
    pub fn new(level: u8, checkpoint: Checkpoint) -> Self {
        Self { level, checkpoint }
    }
}

impl fmt::Display for StatePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.level, self.checkpoint)
    }
}

/// The tracked profile's current position and standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaturityState {
    pub level: u8,
    pub checkpoint: Checkpoint,
    pub status: String,
}

impl MaturityState {
    pub fn new(level: u8, checkpoint: Checkpoint) -> Self {
        Self {
            level,
            checkpoint,
            status: "active".to_string(),
        }
    }

    /// The starting state of a fresh profile.
    pub fn initial() -> Self {
        Self::new(MIN_LEVEL, Checkpoint::A)
    }

    pub fn position(&self) -> StatePosition {
        StatePosition::new(self.level, self.checkpoint)
    }
}

/// Classification of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// One level up, same checkpoint.
    Advance,
    /// One level up, next checkpoint. Gated on confirmed payment.
    Upgrade,
    /// One level down, same checkpoint.
    Rollback,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Upgrade => "upgrade",
            Self::Rollback => "rollback",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the topology graph. Immutable, looked up, never constructed
/// by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    /// Transition identifier, `"{target_level}-{target_checkpoint}"`.
    /// Unique among the outbound edges of any one state.
    pub id: String,
    pub from: StatePosition,
    pub to: StatePosition,
    pub kind: TransitionKind,
    pub requires_payment_gate: bool,
}

impl TransitionSpec {
    fn new(from: StatePosition, to: StatePosition, kind: TransitionKind) -> Self {
        Self {
            id: to.to_string(),
            from,
            to,
            kind,
            requires_payment_gate: kind == TransitionKind::Upgrade,
        }
    }

    /// Human-readable one-liner for presentations.
    pub fn describe(&self) -> String {
        match self.kind {
            TransitionKind::Advance => format!(
                "Advance to level {} checkpoint {}",
                self.to.level, self.to.checkpoint
            ),
            TransitionKind::Upgrade => format!(
                "Upgrade to level {} checkpoint {}",
                self.to.level, self.to.checkpoint
            ),
            TransitionKind::Rollback => format!(
                "Roll back to level {} checkpoint {}",
                self.to.level, self.to.checkpoint
            ),
        }
    }
}

/// Descriptive metadata for one maturity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: u8,
    pub name: String,
    pub description: String,
}

/// Descriptive metadata for one checkpoint tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub checkpoint: Checkpoint,
    pub name: String,
    pub description: String,
}

/// The full static graph plus level/checkpoint metadata.
#[derive(Debug, Clone)]
pub struct Topology {
    outbound: BTreeMap<StatePosition, Vec<TransitionSpec>>,
    levels: Vec<LevelInfo>,
}

impl Topology {
    /// Build the standard five-level, three-checkpoint graph.
    ///
    /// Outbound edges of `(L, C)`, in presentation order:
    /// - Advance to `(L+1, C)` — absent at the top level
    /// - Upgrade to `(L+1, next(C))` — payment gated; absent at the top
    ///   level or top checkpoint
    /// - Rollback to `(L-1, C)` — absent at the bottom level
    pub fn standard() -> Self {
        let mut outbound = BTreeMap::new();
        for level in MIN_LEVEL..=MAX_LEVEL {
            for checkpoint in [Checkpoint::A, Checkpoint::B, Checkpoint::C] {
                let from = StatePosition::new(level, checkpoint);
                let mut edges = Vec::new();
                if level < MAX_LEVEL {
                    edges.push(TransitionSpec::new(
                        from,
                        StatePosition::new(level + 1, checkpoint),
                        TransitionKind::Advance,
                    ));
                    if let Some(next) = checkpoint.next() {
                        edges.push(TransitionSpec::new(
                            from,
                            StatePosition::new(level + 1, next),
                            TransitionKind::Upgrade,
                        ));
                    }
                }
                if level > MIN_LEVEL {
                    edges.push(TransitionSpec::new(
                        from,
                        StatePosition::new(level - 1, checkpoint),
                        TransitionKind::Rollback,
                    ));
                }
                outbound.insert(from, edges);
            }
        }

        let levels = vec![
            LevelInfo {
                level: 1,
                name: "Initial".to_string(),
                description: "Practices exist but are ad hoc and unmeasured".to_string(),
            },
            LevelInfo {
                level: 2,
                name: "Managed".to_string(),
                description: "Core practices are planned and tracked per team".to_string(),
            },
            LevelInfo {
                level: 3,
                name: "Defined".to_string(),
                description: "Practices are standardized across the organization".to_string(),
            },
            LevelInfo {
                level: 4,
                name: "Measured".to_string(),
                description: "Outcomes are quantified and steered by data".to_string(),
            },
            LevelInfo {
                level: 5,
                name: "Optimizing".to_string(),
                description: "Continuous improvement is institutionalized".to_string(),
            },
        ];

        Self { outbound, levels }
    }

    /// The fixed outbound transitions of the given state, in insertion
    /// order. Empty for positions outside the graph.
    pub fn transitions_from(&self, state: &MaturityState) -> &[TransitionSpec] {
        self.outbound
            .get(&state.position())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Check one transition id against the current state.
    ///
    /// Pure lookup: returns the resolved spec on success, a typed rejection
    /// otherwise. Never mutates anything.
    pub fn validate_transition(
        &self,
        current: &MaturityState,
        transition_id: &str,
    ) -> Result<TransitionSpec, TopologyError> {
        let position = current.position();
        let Some(edges) = self.outbound.get(&position) else {
            return Err(TopologyError::UnknownState {
                level: current.level,
            });
        };
        if let Some(spec) = edges.iter().find(|t| t.id == transition_id) {
            return Ok(spec.clone());
        }
        let legal: Vec<&str> = edges.iter().map(|t| t.id.as_str()).collect();
        Err(TopologyError::IllegalTransition {
            transition_id: transition_id.to_string(),
            level: current.level,
            checkpoint: current.checkpoint.to_string(),
            reason: format!("legal transitions from {} are [{}]", position, legal.join(", ")),
        })
    }

    pub fn level_info(&self, level: u8) -> Option<&LevelInfo> {
        self.levels.iter().find(|info| info.level == level)
    }

    pub fn checkpoint_info(&self, checkpoint: Checkpoint) -> CheckpointInfo {
        let (name, description) = match checkpoint {
            Checkpoint::A => (
                "Core practices",
                "The minimum practice set for the level is in place",
            ),
            Checkpoint::B => (
                "Extended practices",
                "The level's practices extend beyond the core set",
            ),
            Checkpoint::C => (
                "Full adoption",
                "Every practice of the level is adopted organization-wide",
            ),
        };
        CheckpointInfo {
            checkpoint,
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::standard()
    }
}
