//! Workload and cluster selectors.
//!
//! Selectors use label matching: every required label must be present
//! with the exact value. An empty label map matches everything.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Reference to one workload instance being placed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
    /// Workload class, used for spread counting and anti-affinity
    /// (e.g. "web", "batch").
    pub class: String,
}

impl WorkloadRef {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Selects the workloads a session is responsible for placing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkloadSelector {
    /// Required label matches (all must match).
    pub match_labels: HashMap<String, String>,
    /// Restrict to these namespaces; empty means all namespaces.
    pub namespaces: Vec<String>,
}

impl WorkloadSelector {
    /// Whether a workload in `namespace` with `labels` is selected.
    pub fn matches(&self, namespace: &str, labels: &HashMap<String, String>) -> bool {
        if !self.namespaces.is_empty() && !self.namespaces.iter().any(|n| n == namespace) {
            return false;
        }
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
    }
}

/// Selects the candidate clusters a session may place onto.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterSelector {
    /// Required label matches (all must match).
    pub match_labels: HashMap<String, String>,
    /// Explicit cluster names; empty means any labeled match.
    pub names: Vec<String>,
}

impl ClusterSelector {
    /// Whether the named cluster with `labels` is selected.
    pub fn matches(&self, name: &str, labels: &HashMap<String, String>) -> bool {
        if !self.names.is_empty() && !self.names.iter().any(|n| n == name) {
            return false;
        }
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k).is_some_and(|lv| lv == v))
    }
}
