//! Conflict resolution: override, merge, or fail.
//!
//! The resolver is pure: it computes an outcome (audit record, final
//! conflict status, and the decision phase changes to apply) and leaves
//! persistence to the session manager. Every resolution attempt
//! produces a [`ConflictResolution`] record, success or not.

use thiserror::Error;
use tracing::{debug, warn};

use tmc_types::{
    ClusterSnapshot, Conflict, ConflictResolution, ConflictResolutionMode,
    ConflictResolutionStrategy, ConflictStatus, ConflictType, DecisionPhase,
    PlacementDecision,
};

/// Errors from strategy selection or resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("no resolution strategy configured for {0:?}")]
    NoStrategy(ConflictType),

    #[error("ambiguous strategies for {0:?}: multiple entries at priority {1}")]
    AmbiguousStrategy(ConflictType, u32),

    #[error("conflict {0} references decision {1} that was not supplied")]
    MissingDecision(String, String),
}

/// Pick the mode for a conflict type: highest-priority match wins.
///
/// Two matching entries at the same priority are a configuration
/// error — resolution never picks one implicitly.
pub fn select_strategy(
    conflict_type: ConflictType,
    strategies: &[ConflictResolutionStrategy],
) -> Result<ConflictResolutionMode, ResolverError> {
    let mut best: Option<&ConflictResolutionStrategy> = None;
    let mut tied = false;
    for entry in strategies.iter().filter(|s| s.conflict_type == conflict_type) {
        match best {
            None => best = Some(entry),
            Some(current) if entry.priority > current.priority => {
                best = Some(entry);
                tied = false;
            }
            Some(current) if entry.priority == current.priority => tied = true,
            Some(_) => {}
        }
    }
    match best {
        None => Err(ResolverError::NoStrategy(conflict_type)),
        Some(entry) if tied => {
            Err(ResolverError::AmbiguousStrategy(conflict_type, entry.priority))
        }
        Some(entry) => Ok(entry.mode),
    }
}

/// Reject strategy lists containing equal-priority duplicates, so the
/// configuration error surfaces at session validation time.
pub fn validate_strategies(
    strategies: &[ConflictResolutionStrategy],
) -> Result<(), ResolverError> {
    for (i, a) in strategies.iter().enumerate() {
        for b in &strategies[i + 1..] {
            if a.conflict_type == b.conflict_type && a.priority == b.priority {
                return Err(ResolverError::AmbiguousStrategy(a.conflict_type, a.priority));
            }
        }
    }
    Ok(())
}

/// A phase change the session manager must apply to a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionChange {
    pub decision_id: String,
    pub to: DecisionPhase,
    pub reason: String,
}

/// The computed outcome of one resolution attempt.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    /// Audit record, recorded regardless of success.
    pub resolution: ConflictResolution,
    /// Resolved, or Failed when the strategy could not resolve.
    pub status: ConflictStatus,
    pub changes: Vec<DecisionChange>,
}

impl ResolutionOutcome {
    pub fn resolved(&self) -> bool {
        self.status == ConflictStatus::Resolved
    }
}

/// Apply a resolution mode to a conflict over the given contenders.
pub fn resolve(
    conflict: &Conflict,
    contenders: &[PlacementDecision],
    snapshot: Option<&ClusterSnapshot>,
    mode: ConflictResolutionMode,
) -> Result<ResolutionOutcome, ResolverError> {
    // Every referenced decision must be supplied.
    for id in &conflict.decisions {
        if !contenders.iter().any(|d| &d.id == id) {
            return Err(ResolverError::MissingDecision(
                conflict.id.clone(),
                id.clone(),
            ));
        }
    }

    let outcome = match mode {
        ConflictResolutionMode::Override => resolve_override(conflict, contenders),
        ConflictResolutionMode::Merge => resolve_merge(conflict, contenders, snapshot),
        ConflictResolutionMode::Fail => resolve_fail(conflict, contenders),
    };

    if outcome.resolved() {
        debug!(conflict = %conflict.id, ?mode, "conflict resolved");
    } else {
        warn!(conflict = %conflict.id, ?mode, reason = %outcome.resolution.reason,
            "conflict resolution failed");
    }
    Ok(outcome)
}

/// Higher-priority decision wins; everyone else fails.
fn resolve_override(conflict: &Conflict, contenders: &[PlacementDecision]) -> ResolutionOutcome {
    // Priority first, score as the secondary key, id for determinism.
    let winner = contenders
        .iter()
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.score.cmp(&b.score))
                .then(b.id.cmp(&a.id))
        })
        .cloned();

    let Some(winner) = winner else {
        return ResolutionOutcome {
            resolution: ConflictResolution {
                mode: ConflictResolutionMode::Override,
                winner: None,
                rejected: Vec::new(),
                reason: "no contenders supplied".to_string(),
            },
            status: ConflictStatus::Failed,
            changes: Vec::new(),
        };
    };

    let rejected: Vec<String> = contenders
        .iter()
        .filter(|d| d.id != winner.id)
        .map(|d| d.id.clone())
        .collect();
    let changes = rejected
        .iter()
        .map(|id| DecisionChange {
            decision_id: id.clone(),
            to: DecisionPhase::Failed,
            reason: format!(
                "overridden by higher-priority decision {} (priority {})",
                winner.id, winner.priority
            ),
        })
        .collect();

    ResolutionOutcome {
        resolution: ConflictResolution {
            mode: ConflictResolutionMode::Override,
            winner: Some(winner.id.clone()),
            rejected,
            reason: format!("decision {} wins {} by priority", winner.id, conflict.id),
        },
        status: ConflictStatus::Resolved,
        changes,
    }
}

/// Both decisions stand if the combined demand still fits. Infeasible
/// merges fail the resolution — never silently downgraded to override.
fn resolve_merge(
    conflict: &Conflict,
    contenders: &[PlacementDecision],
    snapshot: Option<&ClusterSnapshot>,
) -> ResolutionOutcome {
    let fail = |reason: String| ResolutionOutcome {
        resolution: ConflictResolution {
            mode: ConflictResolutionMode::Merge,
            winner: None,
            rejected: Vec::new(),
            reason,
        },
        status: ConflictStatus::Failed,
        changes: Vec::new(),
    };

    if conflict.conflict_type != ConflictType::ResourceContention {
        return fail(format!(
            "merge is only feasible for resource contention, not {:?}",
            conflict.conflict_type
        ));
    }
    let Some(snapshot) = snapshot else {
        return fail("no cluster snapshot available for merge re-check".to_string());
    };

    // The re-check runs against advertised capacity, not free headroom:
    // detection is pessimistic over the unallocated remainder, merge may
    // co-admit up to what the cluster says it can hold.
    let mem: u64 = contenders.iter().map(|d| d.requested.memory_bytes).sum();
    let cpu: u64 = contenders.iter().map(|d| d.requested.cpu_millis).sum();
    if mem > snapshot.capacity.memory_bytes || cpu > snapshot.capacity.cpu_millis {
        return fail(format!(
            "combined demand ({mem} bytes, {cpu}m) does not fit {} capacity",
            snapshot.name
        ));
    }

    ResolutionOutcome {
        resolution: ConflictResolution {
            mode: ConflictResolutionMode::Merge,
            winner: None,
            rejected: Vec::new(),
            reason: format!("combined demand fits {}; all placements stand", snapshot.name),
        },
        status: ConflictStatus::Resolved,
        changes: Vec::new(),
    }
}

/// Fail every contender; the session may re-admit on its next tick.
fn resolve_fail(conflict: &Conflict, contenders: &[PlacementDecision]) -> ResolutionOutcome {
    let rejected: Vec<String> = contenders.iter().map(|d| d.id.clone()).collect();
    let changes = rejected
        .iter()
        .map(|id| DecisionChange {
            decision_id: id.clone(),
            to: DecisionPhase::Failed,
            reason: format!("failed by conflict {} resolution policy", conflict.id),
        })
        .collect();

    ResolutionOutcome {
        resolution: ConflictResolution {
            mode: ConflictResolutionMode::Fail,
            winner: None,
            rejected,
            reason: "all contending placements failed by policy".to_string(),
        },
        status: ConflictStatus::Resolved,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tmc_types::{ClusterCapacity, ResourceRequest, Score, WorkloadRef};

    fn make_decision(id: &str, priority: u32, mem: u64) -> PlacementDecision {
        PlacementDecision {
            id: id.to_string(),
            session_id: "s1".to_string(),
            workload: WorkloadRef {
                namespace: "default".to_string(),
                name: id.to_string(),
                class: "web".to_string(),
            },
            requested: ResourceRequest {
                memory_bytes: mem,
                cpu_millis: 100,
            },
            target_cluster: "c1".to_string(),
            score: Score::new(80).unwrap(),
            reason: "test".to_string(),
            priority,
            constraints: Vec::new(),
            anti_affinity: Vec::new(),
            phase: DecisionPhase::Evaluating,
            context: None,
            rollback_policy: None,
            version: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn make_conflict(conflict_type: ConflictType, ids: &[&str]) -> Conflict {
        Conflict {
            id: "cf-1".to_string(),
            conflict_type,
            decisions: ids.iter().map(|s| s.to_string()).collect(),
            cluster: Some("c1".to_string()),
            detail: "test".to_string(),
            detected_at: 1000,
            status: ConflictStatus::Detected,
            resolution: None,
            version: 0,
        }
    }

    fn make_snapshot(cap_mem: u64) -> ClusterSnapshot {
        ClusterSnapshot {
            name: "c1".to_string(),
            labels: HashMap::new(),
            capacity: ClusterCapacity {
                memory_bytes: cap_mem,
                cpu_millis: 10_000,
            },
            allocated: ClusterCapacity::default(),
            healthy: true,
            taints: Vec::new(),
            placed_replicas: HashMap::new(),
        }
    }

    fn strategy(
        conflict_type: ConflictType,
        mode: ConflictResolutionMode,
        priority: u32,
    ) -> ConflictResolutionStrategy {
        ConflictResolutionStrategy {
            conflict_type,
            mode,
            priority,
        }
    }

    // ── Strategy selection ─────────────────────────────────────────

    #[test]
    fn highest_priority_strategy_wins() {
        let strategies = vec![
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Fail, 1),
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Merge, 5),
        ];
        let mode =
            select_strategy(ConflictType::ResourceContention, &strategies).unwrap();
        assert_eq!(mode, ConflictResolutionMode::Merge);
    }

    #[test]
    fn equal_priority_is_a_config_error() {
        let strategies = vec![
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Fail, 5),
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Merge, 5),
        ];
        assert!(matches!(
            select_strategy(ConflictType::ResourceContention, &strategies),
            Err(ResolverError::AmbiguousStrategy(ConflictType::ResourceContention, 5))
        ));
        assert!(validate_strategies(&strategies).is_err());
    }

    #[test]
    fn missing_strategy_is_an_error() {
        assert!(matches!(
            select_strategy(ConflictType::AffinityConflict, &[]),
            Err(ResolverError::NoStrategy(ConflictType::AffinityConflict))
        ));
    }

    #[test]
    fn distinct_priorities_validate() {
        let strategies = vec![
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Merge, 5),
            strategy(ConflictType::ResourceContention, ConflictResolutionMode::Fail, 1),
            strategy(ConflictType::AffinityConflict, ConflictResolutionMode::Override, 5),
        ];
        assert!(validate_strategies(&strategies).is_ok());
    }

    // ── Override ───────────────────────────────────────────────────

    #[test]
    fn override_fails_the_lower_priority_decision() {
        let conflict = make_conflict(ConflictType::ResourceContention, &["d-1", "d-2"]);
        let contenders = vec![make_decision("d-1", 20, 100), make_decision("d-2", 10, 100)];

        let outcome = resolve(
            &conflict,
            &contenders,
            Some(&make_snapshot(1024)),
            ConflictResolutionMode::Override,
        )
        .unwrap();

        assert!(outcome.resolved());
        assert_eq!(outcome.resolution.winner.as_deref(), Some("d-1"));
        assert_eq!(outcome.resolution.rejected, vec!["d-2"]);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].to, DecisionPhase::Failed);
        assert!(outcome.changes[0].reason.contains("d-1"));
        // The rationale names the conflict it settled.
        assert!(outcome.resolution.reason.contains("cf-1"));
    }

    // ── Merge ──────────────────────────────────────────────────────

    #[test]
    fn feasible_merge_keeps_both() {
        let conflict = make_conflict(ConflictType::ResourceContention, &["d-1", "d-2"]);
        let contenders = vec![make_decision("d-1", 10, 400), make_decision("d-2", 10, 400)];

        let outcome = resolve(
            &conflict,
            &contenders,
            Some(&make_snapshot(1024)),
            ConflictResolutionMode::Merge,
        )
        .unwrap();

        assert!(outcome.resolved());
        assert!(outcome.changes.is_empty());
        assert!(outcome.resolution.rejected.is_empty());
    }

    #[test]
    fn infeasible_merge_fails_without_downgrade() {
        let conflict = make_conflict(ConflictType::ResourceContention, &["d-1", "d-2"]);
        let contenders = vec![make_decision("d-1", 10, 700), make_decision("d-2", 10, 700)];

        let outcome = resolve(
            &conflict,
            &contenders,
            Some(&make_snapshot(1024)),
            ConflictResolutionMode::Merge,
        )
        .unwrap();

        assert_eq!(outcome.status, ConflictStatus::Failed);
        // No decision is failed — both remain where they were.
        assert!(outcome.changes.is_empty());
        // The attempt is still recorded for audit.
        assert!(outcome.resolution.reason.contains("does not fit"));
    }

    #[test]
    fn merge_only_applies_to_resource_contention() {
        let conflict = make_conflict(ConflictType::AffinityConflict, &["d-1", "d-2"]);
        let contenders = vec![make_decision("d-1", 10, 10), make_decision("d-2", 10, 10)];

        let outcome = resolve(
            &conflict,
            &contenders,
            Some(&make_snapshot(1024)),
            ConflictResolutionMode::Merge,
        )
        .unwrap();
        assert_eq!(outcome.status, ConflictStatus::Failed);
    }

    // ── Fail ───────────────────────────────────────────────────────

    #[test]
    fn fail_mode_fails_all_contenders() {
        let conflict = make_conflict(ConflictType::ResourceContention, &["d-1", "d-2"]);
        let contenders = vec![make_decision("d-1", 10, 700), make_decision("d-2", 10, 700)];

        let outcome = resolve(
            &conflict,
            &contenders,
            None,
            ConflictResolutionMode::Fail,
        )
        .unwrap();

        assert!(outcome.resolved());
        assert_eq!(outcome.changes.len(), 2);
        assert!(outcome.changes.iter().all(|c| c.to == DecisionPhase::Failed));
        assert!(outcome.changes.iter().all(|c| !c.reason.is_empty()));
    }

    #[test]
    fn unknown_decision_reference_is_an_error() {
        let conflict = make_conflict(ConflictType::ResourceContention, &["d-1", "d-ghost"]);
        let contenders = vec![make_decision("d-1", 10, 10)];

        assert!(matches!(
            resolve(&conflict, &contenders, None, ConflictResolutionMode::Fail),
            Err(ResolverError::MissingDecision(_, _))
        ));
    }
}
