//! EntityStore — redb-backed persistence for the placement engine.
//!
//! Provides typed CRUD over sessions, decisions, cluster registrations,
//! conflicts, and rollback operations. All values are JSON-serialized
//! into redb's `&[u8]` value columns. The store supports both on-disk
//! and in-memory backends (the latter for testing).
//!
//! Updates are optimistic-concurrency writes: the caller passes the
//! record it read (version N); the write commits only if the stored
//! version is still N and bumps it to N+1. Concurrent writers race on
//! the version and exactly one wins; losers get
//! [`StoreError::StaleVersion`] and must re-read.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use tmc_types::{
    ClusterRegistration, Conflict, PlacementDecision, PlacementSession, RollbackOperation,
};

use crate::error::{StoreError, StoreResult};
use crate::events::{ChangeOp, EntityKind, StoreEvent};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// A persisted entity with a composite key and CAS version.
trait Record: Serialize + DeserializeOwned {
    const KIND: EntityKind;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;

    fn key(&self) -> String;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Record for PlacementSession {
    const KIND: EntityKind = EntityKind::Session;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = SESSIONS;

    fn key(&self) -> String {
        self.table_key()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for PlacementDecision {
    const KIND: EntityKind = EntityKind::Decision;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = DECISIONS;

    fn key(&self) -> String {
        self.table_key()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for ClusterRegistration {
    const KIND: EntityKind = EntityKind::Cluster;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = CLUSTERS;

    fn key(&self) -> String {
        self.name.clone()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for Conflict {
    const KIND: EntityKind = EntityKind::Conflict;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = CONFLICTS;

    fn key(&self) -> String {
        self.id.clone()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Record for RollbackOperation {
    const KIND: EntityKind = EntityKind::Rollback;
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = ROLLBACKS;

    fn key(&self) -> String {
        self.table_key()
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// Thread-safe entity store backed by redb.
#[derive(Clone)]
pub struct EntityStore {
    db: Arc<Database>,
    events: broadcast::Sender<StoreEvent>,
}

impl EntityStore {
    /// Open (or create) a persistent entity store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::with_db(db);
        store.ensure_tables()?;
        debug!(?path, "entity store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory entity store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::with_db(db);
        store.ensure_tables()?;
        debug!("in-memory entity store opened");
        Ok(store)
    }

    fn with_db(db: Database) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            db: Arc::new(db),
            events,
        }
    }

    /// Subscribe to change notifications. Lagging receivers drop
    /// events; this channel is a best-effort watch, not a log.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SESSIONS).map_err(map_err!(Table))?;
        txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(CONFLICTS).map_err(map_err!(Table))?;
        txn.open_table(ROLLBACKS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record operations ──────────────────────────────────

    /// Insert a new record at version 0. Fails if the key exists.
    fn create<R: Record>(&self, record: &mut R) -> StoreResult<()> {
        let key = record.key();
        record.set_version(0);
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StoreError::AlreadyExists(key));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        self.publish(R::KIND, &key, ChangeOp::Created);
        Ok(())
    }

    /// Compare-and-swap update. The record's `version` must match the
    /// stored version; on success it is bumped in place.
    fn update<R: Record>(&self, record: &mut R) -> StoreResult<()> {
        let key = record.key();
        let expected = record.version();

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
            let stored = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    let current: R = serde_json::from_slice(guard.value())
                        .map_err(map_err!(Deserialize))?;
                    current.version()
                }
                None => return Err(StoreError::NotFound(key)),
            };
            if stored != expected {
                return Err(StoreError::StaleVersion {
                    key,
                    expected,
                    stored,
                });
            }
            record.set_version(expected + 1);
            let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;

        self.publish(R::KIND, &key, ChangeOp::Updated);
        Ok(())
    }

    fn get<R: Record>(&self, key: &str) -> StoreResult<Option<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: R =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all records whose key starts with `prefix` (empty prefix
    /// lists the whole table).
    fn list_prefix<R: Record>(&self, prefix: &str) -> StoreResult<Vec<R>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record: R = serde_json::from_slice(value.value())
                    .map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Delete by key. Returns true if it existed.
    fn delete<R: Record>(&self, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(R::TABLE).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if existed {
            self.publish(R::KIND, key, ChangeOp::Deleted);
        }
        Ok(existed)
    }

    fn publish(&self, kind: EntityKind, key: &str, op: ChangeOp) {
        // Best-effort: no receivers (or lagging ones) is not an error.
        let _ = self.events.send(StoreEvent {
            kind,
            key: key.to_string(),
            op,
        });
    }

    // ── Sessions ───────────────────────────────────────────────────

    pub fn create_session(&self, session: &mut PlacementSession) -> StoreResult<()> {
        self.create(session)?;
        debug!(key = %session.table_key(), "session stored");
        Ok(())
    }

    pub fn update_session(&self, session: &mut PlacementSession) -> StoreResult<()> {
        self.update(session)
    }

    pub fn get_session(&self, key: &str) -> StoreResult<Option<PlacementSession>> {
        self.get(key)
    }

    pub fn list_sessions(&self) -> StoreResult<Vec<PlacementSession>> {
        self.list_prefix("")
    }

    pub fn delete_session(&self, key: &str) -> StoreResult<bool> {
        self.delete::<PlacementSession>(key)
    }

    // ── Decisions ──────────────────────────────────────────────────

    pub fn create_decision(&self, decision: &mut PlacementDecision) -> StoreResult<()> {
        self.create(decision)?;
        debug!(key = %decision.table_key(), "decision stored");
        Ok(())
    }

    pub fn update_decision(&self, decision: &mut PlacementDecision) -> StoreResult<()> {
        self.update(decision)
    }

    pub fn get_decision(&self, key: &str) -> StoreResult<Option<PlacementDecision>> {
        self.get(key)
    }

    /// List all decisions recorded for a session.
    pub fn list_decisions_for_session(
        &self,
        session_id: &str,
    ) -> StoreResult<Vec<PlacementDecision>> {
        self.list_prefix(&format!("{session_id}:"))
    }

    pub fn list_decisions(&self) -> StoreResult<Vec<PlacementDecision>> {
        self.list_prefix("")
    }

    pub fn delete_decision(&self, key: &str) -> StoreResult<bool> {
        self.delete::<PlacementDecision>(key)
    }

    // ── Cluster registrations ──────────────────────────────────────

    pub fn create_cluster(&self, cluster: &mut ClusterRegistration) -> StoreResult<()> {
        self.create(cluster)
    }

    pub fn update_cluster(&self, cluster: &mut ClusterRegistration) -> StoreResult<()> {
        self.update(cluster)
    }

    pub fn get_cluster(&self, name: &str) -> StoreResult<Option<ClusterRegistration>> {
        self.get(name)
    }

    pub fn list_clusters(&self) -> StoreResult<Vec<ClusterRegistration>> {
        self.list_prefix("")
    }

    pub fn delete_cluster(&self, name: &str) -> StoreResult<bool> {
        self.delete::<ClusterRegistration>(name)
    }

    // ── Conflicts ──────────────────────────────────────────────────

    pub fn create_conflict(&self, conflict: &mut Conflict) -> StoreResult<()> {
        self.create(conflict)
    }

    pub fn update_conflict(&self, conflict: &mut Conflict) -> StoreResult<()> {
        self.update(conflict)
    }

    pub fn get_conflict(&self, id: &str) -> StoreResult<Option<Conflict>> {
        self.get(id)
    }

    pub fn list_conflicts(&self) -> StoreResult<Vec<Conflict>> {
        self.list_prefix("")
    }

    // ── Rollback operations ────────────────────────────────────────

    pub fn create_rollback(&self, op: &mut RollbackOperation) -> StoreResult<()> {
        self.create(op)
    }

    pub fn update_rollback(&self, op: &mut RollbackOperation) -> StoreResult<()> {
        self.update(op)
    }

    pub fn get_rollback(&self, key: &str) -> StoreResult<Option<RollbackOperation>> {
        self.get(key)
    }

    /// List all rollback operations for a decision.
    pub fn list_rollbacks_for_decision(
        &self,
        decision_id: &str,
    ) -> StoreResult<Vec<RollbackOperation>> {
        self.list_prefix(&format!("{decision_id}:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tmc_types::{
        ClusterCapacity, ClusterCondition, ClusterSelector, ConflictStatus, ConflictType,
        DecisionPhase, ResourceRequest, RollbackStatus, RollbackStep, RollbackTriggerKind,
        Score, SessionConfig, SessionMetrics, SessionPhase, WorkloadRef, WorkloadSelector,
    };

    fn test_session(namespace: &str, name: &str) -> PlacementSession {
        PlacementSession {
            id: format!("{namespace}-{name}"),
            namespace: namespace.to_string(),
            name: name.to_string(),
            workload_selector: WorkloadSelector::default(),
            cluster_selector: ClusterSelector::default(),
            policies: Vec::new(),
            constraints: Default::default(),
            config: SessionConfig::default(),
            phase: SessionPhase::Created,
            metrics: SessionMetrics::default(),
            last_heartbeat: 1000,
            version: 0,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_decision(session_id: &str, id: &str) -> PlacementDecision {
        PlacementDecision {
            id: id.to_string(),
            session_id: session_id.to_string(),
            workload: WorkloadRef {
                namespace: "default".to_string(),
                name: "api".to_string(),
                class: "web".to_string(),
            },
            requested: ResourceRequest {
                memory_bytes: 64 * 1024 * 1024,
                cpu_millis: 250,
            },
            target_cluster: "c1".to_string(),
            score: Score::new(85).unwrap(),
            reason: "best weighted score".to_string(),
            priority: 10,
            constraints: Vec::new(),
            anti_affinity: Vec::new(),
            phase: DecisionPhase::Pending,
            context: None,
            rollback_policy: None,
            version: 0,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_cluster(name: &str) -> ClusterRegistration {
        ClusterRegistration {
            name: name.to_string(),
            labels: HashMap::new(),
            capacity: ClusterCapacity {
                memory_bytes: 8 * 1024 * 1024 * 1024,
                cpu_millis: 16_000,
            },
            allocated: ClusterCapacity::default(),
            condition: ClusterCondition::Ready,
            taints: Vec::new(),
            placed_replicas: HashMap::new(),
            version: 0,
            last_heartbeat: 1000,
        }
    }

    // ── Session CRUD & CAS ─────────────────────────────────────────

    #[test]
    fn session_create_and_get() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "web-rollout");

        store.create_session(&mut session).unwrap();
        let retrieved = store.get_session("default/web-rollout").unwrap();

        assert_eq!(retrieved, Some(session));
    }

    #[test]
    fn session_duplicate_create_fails() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "web-rollout");
        store.create_session(&mut session).unwrap();

        let mut dup = test_session("default", "web-rollout");
        let err = store.create_session(&mut dup).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[test]
    fn session_cas_update_bumps_version() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "web-rollout");
        store.create_session(&mut session).unwrap();
        assert_eq!(session.version, 0);

        session.phase = SessionPhase::Initializing;
        store.update_session(&mut session).unwrap();
        assert_eq!(session.version, 1);

        let stored = store.get_session("default/web-rollout").unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.phase, SessionPhase::Initializing);
    }

    #[test]
    fn stale_write_loses_the_race() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "web-rollout");
        store.create_session(&mut session).unwrap();

        // Two readers both see version 0.
        let mut writer_a = store.get_session("default/web-rollout").unwrap().unwrap();
        let mut writer_b = store.get_session("default/web-rollout").unwrap().unwrap();

        writer_a.phase = SessionPhase::Initializing;
        store.update_session(&mut writer_a).unwrap();

        writer_b.phase = SessionPhase::Terminated;
        let err = store.update_session(&mut writer_b).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleVersion {
                expected: 0,
                stored: 1,
                ..
            }
        ));

        // The first write stands.
        let stored = store.get_session("default/web-rollout").unwrap().unwrap();
        assert_eq!(stored.phase, SessionPhase::Initializing);
    }

    #[test]
    fn update_missing_session_is_not_found() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "ghost");
        let err = store.update_session(&mut session).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    // ── Decision CRUD ──────────────────────────────────────────────

    #[test]
    fn decisions_scoped_by_session_prefix() {
        let store = EntityStore::open_in_memory().unwrap();
        store.create_decision(&mut test_decision("s1", "d-1")).unwrap();
        store.create_decision(&mut test_decision("s1", "d-2")).unwrap();
        store.create_decision(&mut test_decision("s2", "d-1")).unwrap();

        let s1 = store.list_decisions_for_session("s1").unwrap();
        assert_eq!(s1.len(), 2);
        let s2 = store.list_decisions_for_session("s2").unwrap();
        assert_eq!(s2.len(), 1);
    }

    #[test]
    fn decision_cas_serializes_phase_writers() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut d = test_decision("s1", "d-1");
        store.create_decision(&mut d).unwrap();

        let mut w1 = store.get_decision("s1:d-1").unwrap().unwrap();
        let mut w2 = store.get_decision("s1:d-1").unwrap().unwrap();

        w1.phase = DecisionPhase::Evaluating;
        store.update_decision(&mut w1).unwrap();

        w2.phase = DecisionPhase::Terminated;
        assert!(matches!(
            store.update_decision(&mut w2),
            Err(StoreError::StaleVersion { .. })
        ));
    }

    // ── Cluster CRUD ───────────────────────────────────────────────

    #[test]
    fn cluster_crud() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut c1 = test_cluster("c1");
        let mut c2 = test_cluster("c2");
        store.create_cluster(&mut c1).unwrap();
        store.create_cluster(&mut c2).unwrap();

        assert_eq!(store.list_clusters().unwrap().len(), 2);
        assert!(store.get_cluster("c1").unwrap().is_some());
        assert!(store.delete_cluster("c1").unwrap());
        assert!(store.get_cluster("c1").unwrap().is_none());
        assert!(!store.delete_cluster("c1").unwrap());
    }

    // ── Conflict & rollback CRUD ───────────────────────────────────

    #[test]
    fn conflict_round_trip() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut conflict = Conflict {
            id: "cf-1".to_string(),
            conflict_type: ConflictType::ResourceContention,
            decisions: vec!["d-1".to_string(), "d-2".to_string()],
            cluster: Some("c1".to_string()),
            detail: "combined demand exceeds capacity".to_string(),
            detected_at: 1000,
            status: ConflictStatus::Detected,
            resolution: None,
            version: 0,
        };
        store.create_conflict(&mut conflict).unwrap();

        conflict.status = ConflictStatus::Analyzing;
        store.update_conflict(&mut conflict).unwrap();

        let stored = store.get_conflict("cf-1").unwrap().unwrap();
        assert_eq!(stored.status, ConflictStatus::Analyzing);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn rollbacks_scoped_by_decision_prefix() {
        let store = EntityStore::open_in_memory().unwrap();
        for (decision, id) in [("d-1", "rb-1"), ("d-1", "rb-2"), ("d-2", "rb-1")] {
            let mut op = RollbackOperation {
                id: id.to_string(),
                decision_id: decision.to_string(),
                trigger: RollbackTriggerKind::Manual,
                source_cluster: "c1".to_string(),
                target_cluster: None,
                steps: vec![RollbackStep::pending("drain-workload")],
                status: RollbackStatus::Pending,
                started_at: None,
                completed_at: None,
                version: 0,
                created_at: 1000,
            };
            store.create_rollback(&mut op).unwrap();
        }

        assert_eq!(store.list_rollbacks_for_decision("d-1").unwrap().len(), 2);
        assert_eq!(store.list_rollbacks_for_decision("d-2").unwrap().len(), 1);
    }

    // ── Change notifications ───────────────────────────────────────

    #[test]
    fn writes_publish_events() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut rx = store.subscribe();

        let mut session = test_session("default", "api");
        store.create_session(&mut session).unwrap();
        session.phase = SessionPhase::Initializing;
        store.update_session(&mut session).unwrap();
        store.delete_session("default/api").unwrap();

        let created = rx.try_recv().unwrap();
        assert_eq!(created.kind, EntityKind::Session);
        assert_eq!(created.op, ChangeOp::Created);
        assert_eq!(created.key, "default/api");

        assert_eq!(rx.try_recv().unwrap().op, ChangeOp::Updated);
        assert_eq!(rx.try_recv().unwrap().op, ChangeOp::Deleted);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let store = EntityStore::open_in_memory().unwrap();
        let mut session = test_session("default", "api");
        store.create_session(&mut session).unwrap();
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = EntityStore::open(&db_path).unwrap();
            store.create_session(&mut test_session("prod", "api")).unwrap();
        }

        let store = EntityStore::open(&db_path).unwrap();
        let session = store.get_session("prod/api").unwrap();
        assert!(session.is_some());
        assert_eq!(session.unwrap().name, "api");
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = EntityStore::open_in_memory().unwrap();

        assert!(store.list_sessions().unwrap().is_empty());
        assert!(store.list_clusters().unwrap().is_empty());
        assert!(store.list_decisions_for_session("any").unwrap().is_empty());
        assert!(store.list_rollbacks_for_decision("any").unwrap().is_empty());
        assert!(!store.delete_session("nope").unwrap());
        assert!(!store.delete_decision("nope").unwrap());
    }
}
