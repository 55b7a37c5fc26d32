//! Session affinity — keeping a workload class on its previous cluster.

use serde::{Deserialize, Serialize};

use crate::selector::ClusterSelector;

/// How strongly a workload is kept on its previously assigned cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickinessStrength {
    /// Binding must hold; placement elsewhere is a violation.
    Hard,
    /// Binding preferred; scoring favors the bound cluster.
    Soft,
    /// Strength follows observed placement stability.
    Adaptive,
    /// No binding.
    None,
}

/// Binds a workload class to a cluster across repeated placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAffinityPolicy {
    pub workload_class: String,
    pub stickiness: StickinessStrength,
    /// Binding lifetime; expired bindings are re-evaluated.
    pub ttl_ms: u64,
    pub max_concurrent_bindings: u32,
    pub failover: FailoverPolicy,
}

/// What happens when the bound cluster fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverPolicy {
    pub strategy: FailoverStrategy,
    pub delay_ms: u64,
    pub max_attempts: u32,
    /// 1.0 = fixed delay between attempts; >1.0 = exponential.
    pub backoff_multiplier: f64,
    /// Where the workload may move instead.
    pub alternative_clusters: ClusterSelector,
}

/// Closed set of failover strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Move to the best-scoring alternative immediately.
    Immediate,
    /// Wait out `delay_ms`, then move if still failing.
    Delayed,
    /// Record the failure; an operator moves the workload.
    Manual,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self {
            strategy: FailoverStrategy::Delayed,
            delay_ms: 30_000,
            max_attempts: 3,
            backoff_multiplier: 2.0,
            alternative_clusters: ClusterSelector::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_serializes_roundtrip() {
        let policy = SessionAffinityPolicy {
            workload_class: "web".to_string(),
            stickiness: StickinessStrength::Soft,
            ttl_ms: 600_000,
            max_concurrent_bindings: 4,
            failover: FailoverPolicy::default(),
        };

        let json = serde_json::to_string(&policy).unwrap();
        let back: SessionAffinityPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}
