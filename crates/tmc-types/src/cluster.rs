//! Cluster registration and point-in-time snapshots.
//!
//! `ClusterRegistration` is the persisted record for a cluster that has
//! joined the placement domain. `ClusterSnapshot` is the cached
//! capacity/health view the evaluator and conflict detector consume —
//! a point-in-time read supplied by the snapshot provider, never
//! mutated by the engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ClusterName;

/// Persisted registration record for a member cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRegistration {
    pub name: ClusterName,
    pub labels: HashMap<String, String>,
    pub capacity: ClusterCapacity,
    pub allocated: ClusterCapacity,
    pub condition: ClusterCondition,
    pub taints: Vec<Taint>,
    /// Replicas currently placed on this cluster, keyed by workload class.
    pub placed_replicas: HashMap<String, u32>,
    /// CAS version for optimistic-concurrency updates.
    pub version: u64,
    /// Unix timestamp (ms) of the last registration heartbeat.
    pub last_heartbeat: u64,
}

/// Condition of a registered cluster. Defined once; there is no
/// free-form condition string anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCondition {
    Ready,
    Degraded,
    Draining,
    Offline,
}

/// Memory/CPU totals for a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterCapacity {
    pub memory_bytes: u64,
    pub cpu_millis: u64,
}

/// A taint repelling placements unless tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    pub value: String,
}

/// Point-in-time capacity/health view of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub name: ClusterName,
    pub labels: HashMap<String, String>,
    pub capacity: ClusterCapacity,
    pub allocated: ClusterCapacity,
    pub healthy: bool,
    pub taints: Vec<Taint>,
    /// Replicas placed per workload class, for spread tie-breaking.
    pub placed_replicas: HashMap<String, u32>,
}

impl ClusterSnapshot {
    pub fn free_memory_bytes(&self) -> u64 {
        self.capacity.memory_bytes.saturating_sub(self.allocated.memory_bytes)
    }

    pub fn free_cpu_millis(&self) -> u64 {
        self.capacity.cpu_millis.saturating_sub(self.allocated.cpu_millis)
    }

    /// Memory utilization in 0.0..=1.0 (0.0 for zero-capacity clusters).
    pub fn utilization(&self) -> f64 {
        if self.capacity.memory_bytes == 0 {
            return 0.0;
        }
        self.allocated.memory_bytes as f64 / self.capacity.memory_bytes as f64
    }

    /// Replicas of the given workload class already placed here.
    pub fn replicas_of_class(&self, class: &str) -> u32 {
        self.placed_replicas.get(class).copied().unwrap_or(0)
    }
}

impl ClusterRegistration {
    /// The snapshot view of this registration.
    pub fn to_snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            name: self.name.clone(),
            labels: self.labels.clone(),
            capacity: self.capacity,
            allocated: self.allocated,
            healthy: matches!(self.condition, ClusterCondition::Ready),
            taints: self.taints.clone(),
            placed_replicas: self.placed_replicas.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(cap: u64, used: u64) -> ClusterSnapshot {
        ClusterSnapshot {
            name: "c1".to_string(),
            labels: HashMap::new(),
            capacity: ClusterCapacity {
                memory_bytes: cap,
                cpu_millis: 1000,
            },
            allocated: ClusterCapacity {
                memory_bytes: used,
                cpu_millis: 0,
            },
            healthy: true,
            taints: Vec::new(),
            placed_replicas: HashMap::new(),
        }
    }

    #[test]
    fn free_capacity_saturates() {
        let s = snapshot(100, 150); // Over-allocated.
        assert_eq!(s.free_memory_bytes(), 0);
    }

    #[test]
    fn utilization_handles_zero_capacity() {
        assert_eq!(snapshot(0, 0).utilization(), 0.0);
        assert_eq!(snapshot(200, 50).utilization(), 0.25);
    }

    #[test]
    fn registration_snapshot_health_follows_condition() {
        let mut reg = ClusterRegistration {
            name: "c1".to_string(),
            labels: HashMap::new(),
            capacity: ClusterCapacity::default(),
            allocated: ClusterCapacity::default(),
            condition: ClusterCondition::Ready,
            taints: Vec::new(),
            placed_replicas: HashMap::new(),
            version: 0,
            last_heartbeat: 0,
        };
        assert!(reg.to_snapshot().healthy);

        reg.condition = ClusterCondition::Degraded;
        assert!(!reg.to_snapshot().healthy);
    }
}
