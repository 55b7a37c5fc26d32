//! Placement policies, constraints, and retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterSnapshot;
use crate::conflict::ConflictType;
use crate::score::Weight;

/// How the evaluator ranks otherwise-comparable clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Prefer the cluster with the fewest placed replicas for the
    /// workload class.
    Spread,
    /// Prefer the most-utilized cluster that still fits.
    Binpack,
    /// Rank by affinity-term weight sum.
    Affinity,
}

/// One weighted policy within a session's ordered policy list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementPolicy {
    pub name: String,
    pub strategy: PlacementStrategy,
    /// Contribution of this policy's criteria to the composite score.
    pub weight: Weight,
    /// Higher priority wins override resolution and preemption.
    pub priority: u32,
    pub constraints: Vec<PlacementConstraint>,
    pub anti_affinity: Vec<AntiAffinityTerm>,
}

/// A single check a candidate cluster must (or should) satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConstraint {
    pub kind: ConstraintKind,
    /// Required constraints gate eligibility; optional ones only score.
    pub required: bool,
}

/// The closed set of constraint checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Cluster must carry this exact label.
    RequiredLabel { key: String, value: String },
    /// Cluster must have at least this much unallocated memory.
    MinFreeMemoryBytes { bytes: u64 },
    /// Cluster must have at least this much unallocated CPU.
    MinFreeCpuMillis { millis: u64 },
    /// Cluster must be reporting healthy.
    ClusterHealthy,
    /// Cluster must not carry a taint with this key.
    NoTaint { key: String },
}

impl PlacementConstraint {
    /// Check this constraint against a point-in-time cluster snapshot.
    pub fn satisfied_by(&self, snapshot: &ClusterSnapshot) -> bool {
        match &self.kind {
            ConstraintKind::RequiredLabel { key, value } => {
                snapshot.labels.get(key).is_some_and(|v| v == value)
            }
            ConstraintKind::MinFreeMemoryBytes { bytes } => {
                snapshot.free_memory_bytes() >= *bytes
            }
            ConstraintKind::MinFreeCpuMillis { millis } => {
                snapshot.free_cpu_millis() >= *millis
            }
            ConstraintKind::ClusterHealthy => snapshot.healthy,
            ConstraintKind::NoTaint { key } => {
                !snapshot.taints.iter().any(|t| &t.key == key)
            }
        }
    }

    /// Human-readable description for rejection reasons.
    pub fn describe(&self) -> String {
        match &self.kind {
            ConstraintKind::RequiredLabel { key, value } => {
                format!("required label {key}={value}")
            }
            ConstraintKind::MinFreeMemoryBytes { bytes } => {
                format!("minimum free memory {bytes} bytes")
            }
            ConstraintKind::MinFreeCpuMillis { millis } => {
                format!("minimum free cpu {millis}m")
            }
            ConstraintKind::ClusterHealthy => "cluster healthy".to_string(),
            ConstraintKind::NoTaint { key } => format!("no taint {key}"),
        }
    }
}

/// Keep workloads of the named class off the chosen cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiAffinityTerm {
    pub workload_class: String,
    /// Required terms produce conflicts when violated; preferred terms
    /// only influence scoring.
    pub required: bool,
    pub weight: Weight,
}

/// Resource demand of one workload placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub memory_bytes: u64,
    pub cpu_millis: u64,
}

/// Session-level caps on what any single decision may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceConstraints {
    pub max_memory_bytes: Option<u64>,
    pub max_cpu_millis: Option<u64>,
}

impl ResourceConstraints {
    /// Whether a request fits under the configured caps.
    pub fn permits(&self, request: &ResourceRequest) -> bool {
        if self.max_memory_bytes.is_some_and(|cap| request.memory_bytes > cap) {
            return false;
        }
        if self.max_cpu_millis.is_some_and(|cap| request.cpu_millis > cap) {
            return false;
        }
        true
    }
}

/// How to resolve one conflict type, with precedence between entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolutionStrategy {
    pub conflict_type: ConflictType,
    pub mode: ConflictResolutionMode,
    /// Highest priority wins when several entries match a conflict.
    pub priority: u32,
}

/// The closed set of resolution modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionMode {
    /// Higher-priority decision wins, losers fail.
    Override,
    /// Both decisions stand if combined demand still fits.
    Merge,
    /// All contenders fail; the session re-admits later.
    Fail,
}

/// Bounded retry with fixed or exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_ms: u64,
    /// 1.0 = fixed backoff; >1.0 = exponential.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-based: delay after the first failure).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        Duration::from_millis((self.backoff_ms as f64 * factor) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterCapacity, Taint};
    use std::collections::HashMap;

    fn snapshot() -> ClusterSnapshot {
        ClusterSnapshot {
            name: "c1".to_string(),
            labels: HashMap::from([("region".to_string(), "us-east".to_string())]),
            capacity: ClusterCapacity {
                memory_bytes: 1024,
                cpu_millis: 4000,
            },
            allocated: ClusterCapacity {
                memory_bytes: 256,
                cpu_millis: 1000,
            },
            healthy: true,
            taints: vec![Taint {
                key: "maintenance".to_string(),
                value: "scheduled".to_string(),
            }],
            placed_replicas: HashMap::new(),
        }
    }

    #[test]
    fn label_constraint() {
        let c = PlacementConstraint {
            kind: ConstraintKind::RequiredLabel {
                key: "region".to_string(),
                value: "us-east".to_string(),
            },
            required: true,
        };
        assert!(c.satisfied_by(&snapshot()));

        let c = PlacementConstraint {
            kind: ConstraintKind::RequiredLabel {
                key: "region".to_string(),
                value: "eu-west".to_string(),
            },
            required: true,
        };
        assert!(!c.satisfied_by(&snapshot()));
    }

    #[test]
    fn free_resource_constraints() {
        let fits = PlacementConstraint {
            kind: ConstraintKind::MinFreeMemoryBytes { bytes: 768 },
            required: true,
        };
        assert!(fits.satisfied_by(&snapshot()));

        let too_big = PlacementConstraint {
            kind: ConstraintKind::MinFreeMemoryBytes { bytes: 769 },
            required: true,
        };
        assert!(!too_big.satisfied_by(&snapshot()));
    }

    #[test]
    fn taint_constraint() {
        let c = PlacementConstraint {
            kind: ConstraintKind::NoTaint {
                key: "maintenance".to_string(),
            },
            required: true,
        };
        assert!(!c.satisfied_by(&snapshot()));
    }

    #[test]
    fn resource_caps() {
        let caps = ResourceConstraints {
            max_memory_bytes: Some(512),
            max_cpu_millis: None,
        };
        assert!(caps.permits(&ResourceRequest {
            memory_bytes: 512,
            cpu_millis: 9999,
        }));
        assert!(!caps.permits(&ResourceRequest {
            memory_bytes: 513,
            cpu_millis: 0,
        }));
    }

    #[test]
    fn retry_fixed_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_ms: 100,
            backoff_multiplier: 1.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(100));
    }

    #[test]
    fn retry_exponential_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
