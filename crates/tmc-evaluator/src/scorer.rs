//! Per-cluster scoring against a session's policies.
//!
//! Evaluates one candidate cluster using weighted criteria:
//! - **resource-availability**: free capacity relative to the request
//! - **cluster-health**: healthy snapshot or not
//! - per-policy criteria for Spread / Binpack / Affinity strategies
//!
//! The composite score is the weighted mean `Σ(w·s)/Σ(w)`, truncated
//! (not rounded) to an integer by u64 division — criteria
//! {(50,90),(50,95)} yield 92, never 93.

use tmc_types::{
    ClusterEvaluation, ClusterSnapshot, EvaluationCriterion, PlacementPolicy,
    PlacementStrategy, ResourceRequest, Score, ScoreOutOfRange,
};

/// Weighted mean of criterion scores, truncated to an integer.
///
/// An empty criteria list (or all-zero weights) scores zero.
pub fn weighted_score(criteria: &[EvaluationCriterion]) -> Result<Score, ScoreOutOfRange> {
    let sum_w: u64 = criteria.iter().map(|c| c.weight.value()).sum();
    if sum_w == 0 {
        return Score::new(0);
    }
    let sum_ws: u64 = criteria
        .iter()
        .map(|c| c.weight.value() * c.score.value())
        .sum();
    // Integer division truncates toward zero, per the decision audit
    // contract ((85+92)/2 = 88.5 records as 88).
    Score::new(sum_ws / sum_w)
}

/// Score one candidate cluster for a workload request.
///
/// Ineligible clusters are still returned with rejection reasons; the
/// caller decides what to do with them (they are never dropped).
pub fn evaluate_cluster(
    snapshot: &ClusterSnapshot,
    workload_class: &str,
    request: &ResourceRequest,
    policies: &[PlacementPolicy],
) -> Result<ClusterEvaluation, ScoreOutOfRange> {
    let mut criteria = Vec::new();
    let mut rejection_reasons = Vec::new();

    // Hard gate: the request must fit free capacity.
    if request.memory_bytes > snapshot.free_memory_bytes() {
        rejection_reasons.push(format!(
            "insufficient free memory: need {} bytes, have {}",
            request.memory_bytes,
            snapshot.free_memory_bytes()
        ));
    }
    if request.cpu_millis > snapshot.free_cpu_millis() {
        rejection_reasons.push(format!(
            "insufficient free cpu: need {}m, have {}m",
            request.cpu_millis,
            snapshot.free_cpu_millis()
        ));
    }

    criteria.push(EvaluationCriterion {
        name: "resource-availability".to_string(),
        weight: Score::new(50)?,
        score: availability_score(snapshot, request)?,
    });
    criteria.push(EvaluationCriterion {
        name: "cluster-health".to_string(),
        weight: Score::new(30)?,
        score: Score::new(if snapshot.healthy { 100 } else { 0 })?,
    });
    if !snapshot.healthy {
        rejection_reasons.push("cluster unhealthy".to_string());
    }

    for policy in policies {
        // Required constraints gate eligibility; all are reported.
        for constraint in &policy.constraints {
            if !constraint.satisfied_by(snapshot) && constraint.required {
                rejection_reasons.push(format!(
                    "policy {}: unsatisfied {}",
                    policy.name,
                    constraint.describe()
                ));
            }
        }

        // Required anti-affinity forbids co-location with the class.
        for term in &policy.anti_affinity {
            if term.required && snapshot.replicas_of_class(&term.workload_class) > 0 {
                rejection_reasons.push(format!(
                    "policy {}: anti-affinity against class {}",
                    policy.name, term.workload_class
                ));
            }
        }

        criteria.push(strategy_criterion(snapshot, workload_class, request, policy)?);
    }

    let score = weighted_score(&criteria)?;
    Ok(ClusterEvaluation {
        cluster: snapshot.name.clone(),
        score,
        eligible: rejection_reasons.is_empty(),
        criteria,
        rejection_reasons,
    })
}

/// Free-capacity score: the tighter of memory and CPU headroom.
fn availability_score(
    snapshot: &ClusterSnapshot,
    request: &ResourceRequest,
) -> Result<Score, ScoreOutOfRange> {
    let mem = fraction_free(
        snapshot.free_memory_bytes(),
        request.memory_bytes,
        snapshot.capacity.memory_bytes,
    );
    let cpu = fraction_free(
        snapshot.free_cpu_millis(),
        request.cpu_millis,
        snapshot.capacity.cpu_millis,
    );
    Score::new((mem.min(cpu) * 100.0) as u64)
}

/// Free fraction remaining after the request lands, in 0.0..=1.0.
fn fraction_free(free: u64, need: u64, capacity: u64) -> f64 {
    if capacity == 0 {
        return 0.0;
    }
    if need > free {
        return 0.0;
    }
    (free - need) as f64 / capacity as f64
}

/// The per-policy criterion for its strategy.
fn strategy_criterion(
    snapshot: &ClusterSnapshot,
    workload_class: &str,
    request: &ResourceRequest,
    policy: &PlacementPolicy,
) -> Result<EvaluationCriterion, ScoreOutOfRange> {
    let (name, score) = match policy.strategy {
        PlacementStrategy::Spread => {
            // Fewer replicas of the class already here = higher score.
            let replicas = snapshot.replicas_of_class(workload_class) as u64;
            (format!("spread:{}", policy.name), 100 / (1 + replicas))
        }
        PlacementStrategy::Binpack => {
            // Projected utilization after placement; fuller is better.
            let projected = snapshot
                .allocated
                .memory_bytes
                .saturating_add(request.memory_bytes);
            let util = if snapshot.capacity.memory_bytes == 0 {
                0.0
            } else {
                (projected as f64 / snapshot.capacity.memory_bytes as f64).min(1.0)
            };
            (format!("binpack:{}", policy.name), (util * 100.0) as u64)
        }
        PlacementStrategy::Affinity => {
            // Fraction of soft constraints satisfied; neutral when none.
            let soft: Vec<_> = policy.constraints.iter().filter(|c| !c.required).collect();
            let score = if soft.is_empty() {
                50
            } else {
                let matched = soft.iter().filter(|c| c.satisfied_by(snapshot)).count();
                (matched as u64 * 100) / soft.len() as u64
            };
            (format!("affinity:{}", policy.name), score)
        }
    };

    Ok(EvaluationCriterion {
        name,
        weight: policy.weight,
        score: Score::new(score)?,
    })
}
