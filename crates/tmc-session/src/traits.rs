//! Seams to the systems around the engine: cluster state, validation,
//! and event delivery. Each has a production implementation here and
//! takes a fake in tests.

use tracing::{info, warn};

use tmc_store::EntityStore;
use tmc_types::{
    ClusterSelector, ClusterSnapshot, EngineEvent, PlacementSession, ValidationResult,
    ValidationTrigger,
};

/// Supplies capacity/health snapshots of the clusters a session may
/// place onto. Implementations read a cache; evaluation never waits on
/// live cluster round-trips.
pub trait ClusterSnapshotProvider: Send + Sync {
    fn snapshots(&self, selector: &ClusterSelector) -> anyhow::Result<Vec<ClusterSnapshot>>;
}

/// Snapshots derived from cluster registrations in the entity store.
pub struct StoreSnapshotProvider {
    store: EntityStore,
}

impl StoreSnapshotProvider {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }
}

impl ClusterSnapshotProvider for StoreSnapshotProvider {
    fn snapshots(&self, selector: &ClusterSelector) -> anyhow::Result<Vec<ClusterSnapshot>> {
        let clusters = self.store.list_clusters()?;
        Ok(clusters
            .iter()
            .filter(|c| selector.matches(&c.name, &c.labels))
            .map(|c| c.to_snapshot())
            .collect())
    }
}

/// A fixed snapshot set, for embedding and tests.
pub struct StaticSnapshotProvider {
    snapshots: Vec<ClusterSnapshot>,
}

impl StaticSnapshotProvider {
    pub fn new(snapshots: Vec<ClusterSnapshot>) -> Self {
        Self { snapshots }
    }
}

impl ClusterSnapshotProvider for StaticSnapshotProvider {
    fn snapshots(&self, selector: &ClusterSelector) -> anyhow::Result<Vec<ClusterSnapshot>> {
        Ok(self
            .snapshots
            .iter()
            .filter(|s| selector.matches(&s.name, &s.labels))
            .cloned()
            .collect())
    }
}

/// Admission gate run before session creation, session transitions,
/// and workload admission. The engine only inspects the results; rule
/// evaluation lives outside it.
pub trait ValidationGate: Send + Sync {
    fn validate(
        &self,
        trigger: ValidationTrigger,
        session: &PlacementSession,
    ) -> Vec<ValidationResult>;
}

/// Gate that admits everything.
pub struct AllowAllGate;

impl ValidationGate for AllowAllGate {
    fn validate(
        &self,
        _trigger: ValidationTrigger,
        _session: &PlacementSession,
    ) -> Vec<ValidationResult> {
        Vec::new()
    }
}

/// Best-effort event delivery. Must never block or fail a state
/// machine; implementations drop on backpressure.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Sink that logs events through tracing.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: EngineEvent) {
        match &event {
            EngineEvent::Session(e) => {
                info!(session = %e.session_id, kind = ?e.kind, phase = ?e.phase, "{}", e.message)
            }
            EngineEvent::Failover(e) => {
                warn!(decision = %e.decision_id, trigger = ?e.trigger, executed = e.executed,
                    "failover event")
            }
            EngineEvent::Conflict(e) => {
                warn!(conflict = %e.conflict_id, kind = ?e.conflict_type, "conflict detected")
            }
        }
    }
}
