//! Conflict detection between a proposed decision and committed ones.
//!
//! Detection runs against a consistent snapshot: the committed-decision
//! list and cluster snapshots read at evaluation time. Decisions
//! committed later are caught by the next pass, not folded into this
//! one. Finding no conflicts returns an empty list, never an error.

use std::collections::HashMap;

use tracing::debug;

use tmc_types::{
    ClusterSnapshot, Conflict, ConflictDetectionScope, ConflictStatus, ConflictType,
    DecisionPhase, PlacementDecision,
};

/// Phases that count as committed for detection purposes.
fn is_committed(phase: DecisionPhase) -> bool {
    matches!(
        phase,
        DecisionPhase::Decided | DecisionPhase::Executing | DecisionPhase::Active
    )
}

/// Whether `other` falls inside the detection scope for `candidate`.
///
/// Absent scope means the candidate's own session only.
fn in_scope(
    candidate: &PlacementDecision,
    other: &PlacementDecision,
    scope: Option<&ConflictDetectionScope>,
) -> bool {
    if other.session_id == candidate.session_id {
        return true;
    }
    let Some(scope) = scope else {
        return false;
    };
    scope.namespaces.iter().any(|n| *n == other.workload.namespace)
        || scope.clusters.iter().any(|c| *c == other.target_cluster)
        || scope
            .workload_classes
            .iter()
            .any(|w| *w == other.workload.class)
}

/// Find conflicts between a proposed decision and committed decisions.
pub fn detect(
    candidate: &PlacementDecision,
    committed: &[PlacementDecision],
    snapshots: &[ClusterSnapshot],
    scope: Option<&ConflictDetectionScope>,
    now_ms: u64,
) -> Vec<Conflict> {
    let by_name: HashMap<&str, &ClusterSnapshot> =
        snapshots.iter().map(|s| (s.name.as_str(), s)).collect();
    let target = by_name.get(candidate.target_cluster.as_str()).copied();

    let mut conflicts = Vec::new();
    let mut seq = 0u32;
    let mut next_id = |seq: &mut u32| {
        *seq += 1;
        format!("cf-{}-{}", candidate.id, seq)
    };

    // Target cluster gone or unhealthy since evaluation.
    match target {
        None => {
            conflicts.push(make_conflict(
                next_id(&mut seq),
                ConflictType::ClusterUnavailable,
                vec![candidate.id.clone()],
                Some(candidate.target_cluster.clone()),
                format!("target cluster {} not in snapshot", candidate.target_cluster),
                now_ms,
            ));
        }
        Some(snapshot) if !snapshot.healthy => {
            conflicts.push(make_conflict(
                next_id(&mut seq),
                ConflictType::ClusterUnavailable,
                vec![candidate.id.clone()],
                Some(candidate.target_cluster.clone()),
                format!("target cluster {} unhealthy", candidate.target_cluster),
                now_ms,
            ));
        }
        Some(_) => {}
    }

    // A required constraint that held at evaluation time no longer does.
    if let Some(snapshot) = target {
        for constraint in candidate.constraints.iter().filter(|c| c.required) {
            if !constraint.satisfied_by(snapshot) {
                conflicts.push(make_conflict(
                    next_id(&mut seq),
                    ConflictType::ConstraintViolation,
                    vec![candidate.id.clone()],
                    Some(candidate.target_cluster.clone()),
                    format!(
                        "stale evaluation: {} no longer satisfied by {}",
                        constraint.describe(),
                        candidate.target_cluster
                    ),
                    now_ms,
                ));
            }
        }
    }

    for other in committed {
        if other.id == candidate.id && other.session_id == candidate.session_id {
            continue;
        }
        if !is_committed(other.phase) || !in_scope(candidate, other, scope) {
            continue;
        }

        // Resource contention: same cluster, combined claims over the
        // free headroom. Committed-but-not-executing decisions are not
        // in the snapshot's allocated figure yet, so both demands stack
        // on top of it.
        if other.target_cluster == candidate.target_cluster {
            if let Some(snapshot) = target {
                let mem = candidate.requested.memory_bytes + other.requested.memory_bytes;
                let cpu = candidate.requested.cpu_millis + other.requested.cpu_millis;
                if mem > snapshot.free_memory_bytes() || cpu > snapshot.free_cpu_millis() {
                    conflicts.push(make_conflict(
                        next_id(&mut seq),
                        ConflictType::ResourceContention,
                        vec![candidate.id.clone(), other.id.clone()],
                        Some(candidate.target_cluster.clone()),
                        format!(
                            "combined demand ({mem} bytes, {cpu}m) exceeds free capacity of {}",
                            candidate.target_cluster
                        ),
                        now_ms,
                    ));
                }
            }
        }

        // Affinity conflict: candidate lands where a committed decision
        // asserts required anti-affinity against its class.
        if other.target_cluster == candidate.target_cluster {
            for term in other.anti_affinity.iter().filter(|t| t.required) {
                if term.workload_class == candidate.workload.class {
                    conflicts.push(make_conflict(
                        next_id(&mut seq),
                        ConflictType::AffinityConflict,
                        vec![candidate.id.clone(), other.id.clone()],
                        Some(candidate.target_cluster.clone()),
                        format!(
                            "decision {} requires anti-affinity against class {} on {}",
                            other.id, term.workload_class, candidate.target_cluster
                        ),
                        now_ms,
                    ));
                }
            }
        }
    }

    if !conflicts.is_empty() {
        debug!(
            candidate = %candidate.id,
            count = conflicts.len(),
            "conflicts detected"
        );
    }
    conflicts
}

fn make_conflict(
    id: String,
    conflict_type: ConflictType,
    decisions: Vec<String>,
    cluster: Option<String>,
    detail: String,
    now_ms: u64,
) -> Conflict {
    Conflict {
        id,
        conflict_type,
        decisions,
        cluster,
        detail,
        detected_at: now_ms,
        status: ConflictStatus::Detected,
        resolution: None,
        version: 0,
    }
}
