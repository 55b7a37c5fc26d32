//! Evaluation over a candidate set: scoring, ranking, and selection.
//!
//! Evaluation is pure: it reads a caller-supplied snapshot of cluster
//! capacity/health and never performs I/O or health probes. The
//! cancellation flag is checked between candidates so a terminating
//! session can abandon an in-flight evaluation.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use tmc_types::{
    AlternativePlacement, ClusterEvaluation, ClusterSnapshot, PlacementPolicy,
    PlacementStrategy, ResourceRequest, ScoreOutOfRange, WorkloadRef,
};

use crate::cancel::CancellationFlag;
use crate::scorer::evaluate_cluster;

/// Errors from an evaluation pass.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluation cancelled")]
    Cancelled,

    #[error(transparent)]
    Score(#[from] ScoreOutOfRange),
}

/// Name of the scoring algorithm recorded in decision contexts.
pub const ALGORITHM: &str = "weighted-criteria/v1";

/// Score every candidate cluster for the workload.
///
/// Ineligible clusters appear in the result with rejection reasons;
/// the list preserves candidate order (ranking is a separate step).
pub fn evaluate(
    workload: &WorkloadRef,
    candidates: &[ClusterSnapshot],
    policies: &[PlacementPolicy],
    request: &ResourceRequest,
    cancel: &CancellationFlag,
) -> Result<Vec<ClusterEvaluation>, EvaluatorError> {
    let mut evaluations = Vec::with_capacity(candidates.len());
    for snapshot in candidates {
        if cancel.is_cancelled() {
            debug!(workload = %workload.key(), "evaluation cancelled mid-pass");
            return Err(EvaluatorError::Cancelled);
        }
        evaluations.push(evaluate_cluster(
            snapshot,
            &workload.class,
            request,
            policies,
        )?);
    }
    Ok(evaluations)
}

/// The chosen placement plus rank-ordered losers.
#[derive(Debug, Clone)]
pub struct Selection {
    pub winner: ClusterEvaluation,
    pub alternatives: Vec<AlternativePlacement>,
}

/// Pick the best eligible cluster, applying strategy tie-breaking.
///
/// Ties on score break by strategy (Spread: fewest placed replicas of
/// the workload class; Binpack: highest utilization; Affinity: highest
/// affinity criterion weight sum), then by cluster name ascending so
/// results are reproducible.
pub fn select_placement(
    evaluations: &[ClusterEvaluation],
    strategy: PlacementStrategy,
    candidates: &[ClusterSnapshot],
    workload_class: &str,
) -> Option<Selection> {
    let by_name: HashMap<&str, &ClusterSnapshot> =
        candidates.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut eligible: Vec<&ClusterEvaluation> =
        evaluations.iter().filter(|e| e.eligible).collect();
    if eligible.is_empty() {
        return None;
    }

    eligible.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| {
                tie_break_key(a, strategy, &by_name, workload_class)
                    .cmp(&tie_break_key(b, strategy, &by_name, workload_class))
            })
            .then_with(|| a.cluster.cmp(&b.cluster))
    });

    let winner = eligible[0].clone();
    let alternatives = eligible[1..]
        .iter()
        .enumerate()
        .map(|(i, e)| AlternativePlacement {
            cluster: e.cluster.clone(),
            score: e.score,
            rank: i as u32 + 1,
        })
        .collect();

    Some(Selection {
        winner,
        alternatives,
    })
}

/// Strategy-specific ordering key; lower sorts first.
fn tie_break_key(
    eval: &ClusterEvaluation,
    strategy: PlacementStrategy,
    by_name: &HashMap<&str, &ClusterSnapshot>,
    workload_class: &str,
) -> u64 {
    let snapshot = match by_name.get(eval.cluster.as_str()) {
        Some(s) => *s,
        None => return u64::MAX,
    };
    match strategy {
        PlacementStrategy::Spread => u64::from(snapshot.replicas_of_class(workload_class)),
        PlacementStrategy::Binpack => {
            // Higher utilization wins; invert for ascending sort.
            u64::MAX - (snapshot.utilization() * 10_000.0) as u64
        }
        PlacementStrategy::Affinity => {
            // Higher affinity criterion weight·score sum wins.
            let sum: u64 = eval
                .criteria
                .iter()
                .filter(|c| c.name.starts_with("affinity:"))
                .map(|c| c.weight.value() * c.score.value())
                .sum();
            u64::MAX - sum
        }
    }
}
