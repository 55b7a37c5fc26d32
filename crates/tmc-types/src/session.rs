//! Placement sessions — bounded units of placement work.

use serde::{Deserialize, Serialize};

use crate::SessionId;
use crate::policy::{ConflictResolutionStrategy, PlacementPolicy, ResourceConstraints, RetryPolicy};
use crate::selector::{ClusterSelector, WorkloadSelector};

/// Lifecycle phase of a placement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    Initializing,
    Active,
    Suspended,
    Completing,
    Completed,
    Failed,
    Terminated,
}

impl SessionPhase {
    /// All phases, for mechanical transition-table enumeration in tests.
    pub const ALL: [SessionPhase; 8] = [
        SessionPhase::Created,
        SessionPhase::Initializing,
        SessionPhase::Active,
        SessionPhase::Suspended,
        SessionPhase::Completing,
        SessionPhase::Completed,
        SessionPhase::Failed,
        SessionPhase::Terminated,
    ];

    /// The fixed transition table. Terminated is reachable from every
    /// non-terminal phase; Failed may restart to Active.
    pub fn allowed_transitions(self) -> &'static [SessionPhase] {
        use SessionPhase::*;
        match self {
            Created => &[Initializing, Terminated],
            Initializing => &[Active, Failed, Terminated],
            Active => &[Suspended, Completing, Failed, Terminated],
            Suspended => &[Active, Failed, Terminated],
            Completing => &[Completed, Failed, Terminated],
            Completed => &[],
            Failed => &[Active, Terminated],
            Terminated => &[],
        }
    }

    pub fn can_transition_to(self, to: SessionPhase) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// A bounded placement campaign for a workload selector across a
/// cluster selector. Owns its decisions exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementSession {
    pub id: SessionId,
    pub namespace: String,
    pub name: String,
    pub workload_selector: WorkloadSelector,
    pub cluster_selector: ClusterSelector,
    /// Ordered, weighted policies; earlier entries rank first on ties.
    pub policies: Vec<PlacementPolicy>,
    pub constraints: ResourceConstraints,
    pub config: SessionConfig,
    pub phase: SessionPhase,
    pub metrics: SessionMetrics,
    /// Unix timestamp (ms) of the last heartbeat.
    pub last_heartbeat: u64,
    /// CAS version for optimistic-concurrency updates.
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PlacementSession {
    /// Composite key for the sessions table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Session-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session fails if no heartbeat arrives within this window.
    pub timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Admissions beyond this count are rejected, not queued.
    pub max_decisions: u32,
    /// Resolution strategies in precedence order (by priority field).
    pub conflict_resolution: Vec<ConflictResolutionStrategy>,
    pub persistence: PersistenceStrategy,
    pub recovery: Option<RecoveryPolicy>,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
            heartbeat_interval_ms: 10_000,
            max_decisions: 100,
            conflict_resolution: Vec::new(),
            persistence: PersistenceStrategy::Durable,
            recovery: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Where session state lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStrategy {
    /// Every mutation committed to the entity store.
    Durable,
    /// Kept in memory, rebuilt on restart.
    Ephemeral,
}

/// How a failed session may be brought back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    /// Automatically restart a Failed session to Active.
    pub auto_restart: bool,
    pub max_restarts: u32,
}

/// Aggregated counters, updated on every decision phase change.
///
/// Invariants: `total_decisions` only increases, and
/// `successful_decisions + failed_decisions <= total_decisions`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_decisions: u64,
    pub active_decisions: u64,
    pub successful_decisions: u64,
    pub failed_decisions: u64,
    pub conflicts_resolved: u64,
    pub avg_decision_time_ms: f64,
}

impl SessionMetrics {
    /// Record a newly admitted decision.
    pub fn record_admission(&mut self) {
        self.total_decisions += 1;
        self.active_decisions += 1;
    }

    /// Record a decision reaching a successful terminal phase.
    pub fn record_success(&mut self, decision_time_ms: u64) {
        self.successful_decisions += 1;
        self.active_decisions = self.active_decisions.saturating_sub(1);
        self.fold_decision_time(decision_time_ms);
    }

    /// Record a decision reaching a failed terminal phase.
    pub fn record_failure(&mut self, decision_time_ms: u64) {
        self.failed_decisions += 1;
        self.active_decisions = self.active_decisions.saturating_sub(1);
        self.fold_decision_time(decision_time_ms);
    }

    pub fn record_conflict_resolved(&mut self) {
        self.conflicts_resolved += 1;
    }

    /// Whether the counter invariants hold.
    pub fn consistent(&self) -> bool {
        self.successful_decisions + self.failed_decisions <= self.total_decisions
            && self.active_decisions <= self.total_decisions
    }

    fn fold_decision_time(&mut self, ms: u64) {
        let settled = self.successful_decisions + self.failed_decisions;
        if settled == 0 {
            return;
        }
        // Running mean over settled decisions.
        self.avg_decision_time_ms +=
            (ms as f64 - self.avg_decision_time_ms) / settled as f64;
    }
}
