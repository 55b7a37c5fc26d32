//! Rollback operations — reversal of an executing or active decision.

use serde::{Deserialize, Serialize};

use crate::{ClusterName, DecisionId, RollbackId};

/// What started a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackTriggerKind {
    HealthCheck,
    ResourceExhaustion,
    PerformanceDegradation,
    Manual,
}

/// Automatic trigger condition. Fires only after the condition holds
/// continuously for `duration_ms` (debounce); transient breaches are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackTrigger {
    pub kind: RollbackTriggerKind,
    /// Metric threshold whose breach arms the trigger.
    pub threshold: f64,
    pub duration_ms: u64,
}

/// Per-decision rollback behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPolicy {
    /// When false, trigger firings are recorded but rollback only runs
    /// on explicit request.
    pub auto_rollback: bool,
    pub triggers: Vec<RollbackTrigger>,
    /// Budget of automatic attempts per decision; exceeding it fails
    /// the decision terminally.
    pub max_failover_attempts: u32,
    /// Keep failed steps (with their error) in the operation history.
    pub retain_history: bool,
}

impl Default for RollbackPolicy {
    fn default() -> Self {
        Self {
            auto_rollback: true,
            triggers: Vec::new(),
            max_failover_attempts: 3,
            retain_history: true,
        }
    }
}

/// Terminal-status lifecycle of one rollback operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RollbackStatus {
    pub const ALL: [RollbackStatus; 5] = [
        RollbackStatus::Pending,
        RollbackStatus::InProgress,
        RollbackStatus::Completed,
        RollbackStatus::Failed,
        RollbackStatus::Cancelled,
    ];

    pub fn allowed_transitions(self) -> &'static [RollbackStatus] {
        use RollbackStatus::*;
        match self {
            Pending => &[InProgress, Cancelled],
            InProgress => &[Completed, Failed, Cancelled],
            Completed => &[],
            Failed => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: RollbackStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Status of a single step within an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One ordered step of a rollback (e.g. drain-workload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackStep {
    pub name: String,
    pub status: StepStatus,
    pub error: Option<String>,
}

impl RollbackStep {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Pending,
            error: None,
        }
    }
}

/// One rollback attempt for a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackOperation {
    pub id: RollbackId,
    pub decision_id: DecisionId,
    pub trigger: RollbackTriggerKind,
    pub source_cluster: ClusterName,
    /// Cluster the workload falls back to, when known.
    pub target_cluster: Option<ClusterName>,
    pub steps: Vec<RollbackStep>,
    pub status: RollbackStatus,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    /// CAS version for optimistic-concurrency updates.
    pub version: u64,
    pub created_at: u64,
}

impl RollbackOperation {
    /// Composite key for the rollbacks table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.decision_id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lifecycle() {
        use RollbackStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
        }
    }

    #[test]
    fn default_policy_is_automatic() {
        let policy = RollbackPolicy::default();
        assert!(policy.auto_rollback);
        assert!(policy.retain_history);
        assert_eq!(policy.max_failover_attempts, 3);
    }

    #[test]
    fn operation_serializes_roundtrip() {
        let op = RollbackOperation {
            id: "rb-1".to_string(),
            decision_id: "d-1".to_string(),
            trigger: RollbackTriggerKind::HealthCheck,
            source_cluster: "c1".to_string(),
            target_cluster: Some("c2".to_string()),
            steps: vec![
                RollbackStep::pending("drain-workload"),
                RollbackStep::pending("redeploy-workload"),
            ],
            status: RollbackStatus::Pending,
            started_at: None,
            completed_at: None,
            version: 0,
            created_at: 1000,
        };

        let json = serde_json::to_string(&op).unwrap();
        let back: RollbackOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
