//! Detected contention between placement decisions.
//!
//! A conflict references its decisions by id only (weak reference) — a
//! conflict record may outlive the losing decision's active phase.

use serde::{Deserialize, Serialize};

use crate::policy::ConflictResolutionMode;
use crate::{ClusterName, ConflictId, DecisionId};

/// The closed set of conflict categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ResourceContention,
    PolicyViolation,
    AffinityConflict,
    ConstraintViolation,
    ClusterUnavailable,
}

/// Lifecycle of a conflict record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Analyzing,
    Resolving,
    Resolved,
    Failed,
}

impl ConflictStatus {
    pub const ALL: [ConflictStatus; 5] = [
        ConflictStatus::Detected,
        ConflictStatus::Analyzing,
        ConflictStatus::Resolving,
        ConflictStatus::Resolved,
        ConflictStatus::Failed,
    ];

    pub fn allowed_transitions(self) -> &'static [ConflictStatus] {
        use ConflictStatus::*;
        match self {
            Detected => &[Analyzing],
            Analyzing => &[Resolving],
            Resolving => &[Resolved, Failed],
            Resolved => &[],
            Failed => &[],
        }
    }

    pub fn can_transition_to(self, to: ConflictStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Detected contention between two or more decisions over one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub conflict_type: ConflictType,
    /// Ids of the contending decisions (weak references).
    pub decisions: Vec<DecisionId>,
    /// The contended cluster, when the conflict is cluster-scoped.
    pub cluster: Option<ClusterName>,
    pub detail: String,
    /// Unix timestamp (ms) of detection.
    pub detected_at: u64,
    pub status: ConflictStatus,
    /// Recorded for every resolution attempt, success or not.
    pub resolution: Option<ConflictResolution>,
    /// CAS version for optimistic-concurrency updates.
    pub version: u64,
}

/// Audit record of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub mode: ConflictResolutionMode,
    /// Winning decision, when the mode produces one.
    pub winner: Option<DecisionId>,
    /// Decisions failed by the resolution.
    pub rejected: Vec<DecisionId>,
    pub reason: String,
}

/// Which decisions a detection pass considers. Absent scope means the
/// candidate's own session only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictDetectionScope {
    pub namespaces: Vec<String>,
    pub clusters: Vec<ClusterName>,
    pub workload_classes: Vec<String>,
}

/// Summary of outstanding conflicts for a status object.
///
/// `has_conflicts()` is derived from the active list, so
/// `has_conflicts == true` implies a non-empty list by construction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictSummary {
    active_conflicts: Vec<ConflictId>,
}

impl ConflictSummary {
    pub fn new(active_conflicts: Vec<ConflictId>) -> Self {
        Self { active_conflicts }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.active_conflicts.is_empty()
    }

    pub fn active_conflicts(&self) -> &[ConflictId] {
        &self.active_conflicts
    }

    pub fn add(&mut self, id: ConflictId) {
        if !self.active_conflicts.contains(&id) {
            self.active_conflicts.push(id);
        }
    }

    /// Drop a resolved conflict. Returns true if it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.active_conflicts.len();
        self.active_conflicts.retain(|c| c != id);
        self.active_conflicts.len() != before
    }
}
