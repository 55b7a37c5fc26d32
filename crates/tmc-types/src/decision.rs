//! Placement decisions and their immutable evaluation context.

use serde::{Deserialize, Serialize};

use crate::policy::{
    AntiAffinityTerm, PlacementConstraint, PlacementStrategy, ResourceRequest,
};
use crate::rollback::RollbackPolicy;
use crate::score::{Score, Weight};
use crate::selector::WorkloadRef;
use crate::{ClusterName, DecisionId, SessionId};

/// Lifecycle phase of a placement decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPhase {
    Pending,
    Evaluating,
    Decided,
    Executing,
    Active,
    Completed,
    Failed,
    RolledBack,
    Terminated,
}

impl DecisionPhase {
    /// All phases, for mechanical transition-table enumeration in tests.
    pub const ALL: [DecisionPhase; 9] = [
        DecisionPhase::Pending,
        DecisionPhase::Evaluating,
        DecisionPhase::Decided,
        DecisionPhase::Executing,
        DecisionPhase::Active,
        DecisionPhase::Completed,
        DecisionPhase::Failed,
        DecisionPhase::RolledBack,
        DecisionPhase::Terminated,
    ];

    /// The fixed transition table. Completed, Failed, RolledBack, and
    /// Terminated are terminal — there is no path from Completed back
    /// to Pending.
    pub fn allowed_transitions(self) -> &'static [DecisionPhase] {
        use DecisionPhase::*;
        match self {
            Pending => &[Evaluating, Terminated],
            Evaluating => &[Decided, Failed, Terminated],
            Decided => &[Executing, Terminated],
            Executing => &[Active, RolledBack, Failed, Terminated],
            Active => &[Completed, RolledBack, Failed, Terminated],
            Completed => &[],
            Failed => &[],
            RolledBack => &[],
            Terminated => &[],
        }
    }

    pub fn can_transition_to(self, to: DecisionPhase) -> bool {
        self.allowed_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// One scheduling outcome for one workload within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementDecision {
    pub id: DecisionId,
    pub session_id: SessionId,
    pub workload: WorkloadRef,
    pub requested: ResourceRequest,
    pub target_cluster: ClusterName,
    pub score: Score,
    /// Human-readable rationale; never empty for failed decisions.
    pub reason: String,
    /// Priority inherited from the winning policy, for override
    /// resolution between contending decisions.
    pub priority: u32,
    /// Required constraints captured at evaluation time, re-checked by
    /// the conflict detector for staleness.
    pub constraints: Vec<PlacementConstraint>,
    /// Anti-affinity terms this decision asserts against later placements.
    pub anti_affinity: Vec<AntiAffinityTerm>,
    pub phase: DecisionPhase,
    pub context: Option<DecisionContext>,
    pub rollback_policy: Option<RollbackPolicy>,
    /// CAS version for optimistic-concurrency updates.
    pub version: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PlacementDecision {
    /// Composite key for the decisions table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.session_id, self.id)
    }
}

/// Immutable audit trail attached to a decision at decide time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub decision_id: DecisionId,
    pub algorithm: String,
    pub evaluations: Vec<ClusterEvaluation>,
    pub applied_policies: Vec<AppliedPolicy>,
    /// Rank-ordered losing candidates.
    pub alternatives: Vec<AlternativePlacement>,
    pub metrics: DecisionMetrics,
}

/// Scored evaluation of one candidate cluster.
///
/// Ineligible clusters still appear with populated rejection reasons;
/// they are never dropped from the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvaluation {
    pub cluster: ClusterName,
    pub score: Score,
    pub eligible: bool,
    pub criteria: Vec<EvaluationCriterion>,
    pub rejection_reasons: Vec<String>,
}

/// One weighted factor contributing to a cluster's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationCriterion {
    pub name: String,
    pub weight: Weight,
    pub score: Score,
}

/// A policy that participated in an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedPolicy {
    pub name: String,
    pub strategy: PlacementStrategy,
    pub weight: Weight,
    pub priority: u32,
}

/// A losing candidate, by rank (1 = first runner-up).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativePlacement {
    pub cluster: ClusterName,
    pub score: Score,
    pub rank: u32,
}

/// Counts and durations for one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub clusters_evaluated: u32,
    pub clusters_eligible: u32,
    pub evaluation_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_valid() {
        use DecisionPhase::*;
        let path = [Pending, Evaluating, Decided, Executing, Active, Completed];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{:?} -> {:?} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn completed_admits_no_transition() {
        for to in DecisionPhase::ALL {
            assert!(!DecisionPhase::Completed.can_transition_to(to), "{to:?}");
        }
    }

    #[test]
    fn evaluating_may_fail_and_executing_may_roll_back() {
        assert!(DecisionPhase::Evaluating.can_transition_to(DecisionPhase::Failed));
        assert!(DecisionPhase::Executing.can_transition_to(DecisionPhase::RolledBack));
        assert!(!DecisionPhase::Pending.can_transition_to(DecisionPhase::Failed));
        assert!(!DecisionPhase::Decided.can_transition_to(DecisionPhase::RolledBack));
    }

    #[test]
    fn terminal_set() {
        use DecisionPhase::*;
        for phase in DecisionPhase::ALL {
            let expect = matches!(phase, Completed | Failed | RolledBack | Terminated);
            assert_eq!(phase.is_terminal(), expect, "{phase:?}");
        }
    }

    #[test]
    fn terminated_reachable_from_all_non_terminal_phases() {
        for phase in DecisionPhase::ALL {
            if !phase.is_terminal() {
                assert!(phase.can_transition_to(DecisionPhase::Terminated), "{phase:?}");
            }
        }
    }

    #[test]
    fn context_serializes_roundtrip() {
        let ctx = DecisionContext {
            decision_id: "d-1".to_string(),
            algorithm: "weighted-criteria".to_string(),
            evaluations: vec![ClusterEvaluation {
                cluster: "c1".to_string(),
                score: Score::new(88).unwrap(),
                eligible: true,
                criteria: vec![EvaluationCriterion {
                    name: "resource-availability".to_string(),
                    weight: Score::new(50).unwrap(),
                    score: Score::new(90).unwrap(),
                }],
                rejection_reasons: Vec::new(),
            }],
            applied_policies: Vec::new(),
            alternatives: vec![AlternativePlacement {
                cluster: "c2".to_string(),
                score: Score::new(70).unwrap(),
                rank: 1,
            }],
            metrics: DecisionMetrics {
                clusters_evaluated: 2,
                clusters_eligible: 2,
                evaluation_duration_ms: 4,
            },
        };

        let json = serde_json::to_string(&ctx).unwrap();
        let back: DecisionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
