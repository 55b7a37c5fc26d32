//! Engine events emitted for downstream consumers.
//!
//! Delivery is best-effort and must never block a state machine.

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictType;
use crate::rollback::RollbackTriggerKind;
use crate::session::SessionPhase;
use crate::{ClusterName, ConflictId, DecisionId, SessionId};

/// Session lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub kind: SessionEventKind,
    pub phase: SessionPhase,
    pub message: String,
    pub at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    PhaseChanged,
    HeartbeatTimeout,
    DecisionRecorded,
    Terminated,
}

/// A workload moved (or was scheduled to move) between clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub decision_id: DecisionId,
    pub trigger: RollbackTriggerKind,
    pub from_cluster: ClusterName,
    pub to_cluster: Option<ClusterName>,
    /// False when auto_rollback is off and the firing was record-only.
    pub executed: bool,
    pub at: u64,
}

/// A conflict was detected between decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetected {
    pub conflict_id: ConflictId,
    pub conflict_type: ConflictType,
    pub decisions: Vec<DecisionId>,
    pub at: u64,
}

/// Envelope over everything the engine emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Session(SessionEvent),
    Failover(FailoverEvent),
    Conflict(ConflictDetected),
}
