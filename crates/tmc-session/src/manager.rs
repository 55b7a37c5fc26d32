//! The session manager: lifecycle, heartbeats, and the admission
//! pipeline that turns a workload into a recorded placement decision.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use tmc_conflict::{detect, resolve, select_strategy, validate_strategies};
use tmc_evaluator::{
    ALGORITHM, CancellationFlag, evaluate, select_placement,
};
use tmc_recorder::DecisionRecorder;
use tmc_rollback::{RollbackOrchestrator, StepExecutor, TriggerMonitor};
use tmc_store::{EntityStore, StoreError};
use tmc_types::{
    AppliedPolicy, ConflictDetected, ConflictDetectionScope, ConflictStatus,
    DecisionContext, DecisionMetrics, DecisionPhase, EngineEvent, PlacementDecision,
    PlacementSession,
    ResourceRequest, RollbackTriggerKind, SessionEvent, SessionEventKind, SessionPhase,
    ValidationTrigger, WorkloadRef, any_blocking,
};

use crate::error::{SessionError, SessionResult};
use crate::traits::{AllowAllGate, ClusterSnapshotProvider, EventSink, TracingEventSink, ValidationGate};

pub struct SessionManager {
    store: EntityStore,
    recorder: DecisionRecorder,
    rollbacks: RollbackOrchestrator,
    snapshots: Arc<dyn ClusterSnapshotProvider>,
    gate: Arc<dyn ValidationGate>,
    events: Arc<dyn EventSink>,
    /// Widens conflict detection beyond the owning session when set.
    scope: Option<ConflictDetectionScope>,
    monitor: Mutex<TriggerMonitor>,
    cancels: RwLock<HashMap<String, CancellationFlag>>,
    /// Automatic restart count per session key, process-local.
    restarts: RwLock<HashMap<String, u32>>,
}

impl SessionManager {
    pub fn new(store: EntityStore, snapshots: Arc<dyn ClusterSnapshotProvider>) -> Self {
        let recorder = DecisionRecorder::new(store.clone());
        let rollbacks = RollbackOrchestrator::new(store.clone());
        Self {
            store,
            recorder,
            rollbacks,
            snapshots,
            gate: Arc::new(AllowAllGate),
            events: Arc::new(TracingEventSink),
            scope: None,
            monitor: Mutex::new(TriggerMonitor::new()),
            cancels: RwLock::new(HashMap::new()),
            restarts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn ValidationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_scope(mut self, scope: ConflictDetectionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Validate and persist a new session in the Created phase.
    pub fn create_session(
        &self,
        session: &mut PlacementSession,
        now_ms: u64,
    ) -> SessionResult<()> {
        if session.id.is_empty() || session.namespace.is_empty() || session.name.is_empty() {
            return Err(SessionError::Validation(
                "id, namespace, and name are required".to_string(),
            ));
        }
        if session.policies.is_empty() {
            return Err(SessionError::Validation(
                "at least one placement policy is required".to_string(),
            ));
        }
        if session.config.max_decisions == 0 {
            return Err(SessionError::Validation(
                "max_decisions must be positive".to_string(),
            ));
        }
        if session.config.timeout_ms == 0 || session.config.heartbeat_interval_ms == 0 {
            return Err(SessionError::Validation(
                "timeout and heartbeat interval must be positive".to_string(),
            ));
        }
        validate_strategies(&session.config.conflict_resolution)?;

        session.phase = SessionPhase::Created;
        session.metrics = Default::default();
        session.last_heartbeat = now_ms;
        session.created_at = now_ms;
        session.updated_at = now_ms;

        let results = self.gate.validate(ValidationTrigger::SessionCreate, session);
        if any_blocking(&results) {
            let reasons: Vec<&str> = results
                .iter()
                .filter(|r| r.is_blocking())
                .map(|r| r.message.as_str())
                .collect();
            return Err(SessionError::Validation(reasons.join("; ")));
        }

        self.store.create_session(session)?;
        info!(session = %session.id, key = %session.table_key(), "session created");
        self.publish_session(session, SessionEventKind::Created, "session created", now_ms);
        Ok(())
    }

    /// Move a session to `to` through the transition table.
    ///
    /// Re-delivery of the same transition is a no-op. Terminating a
    /// session cascades: in-flight evaluation is cancelled and every
    /// open decision is terminated with it.
    pub fn transition_session(
        &self,
        key: &str,
        to: SessionPhase,
        now_ms: u64,
    ) -> SessionResult<PlacementSession> {
        let mut retried = false;
        let session = loop {
            let mut session = self.load_session(key)?;
            if session.phase == to {
                return Ok(session);
            }
            if !session.phase.can_transition_to(to) {
                return Err(SessionError::InvalidTransition {
                    key: key.to_string(),
                    from: session.phase,
                    to,
                });
            }
            let results = self.gate.validate(ValidationTrigger::SessionTransition, &session);
            if any_blocking(&results) {
                return Err(SessionError::Validation(format!(
                    "transition to {to:?} refused by validation"
                )));
            }

            let from = session.phase;
            session.phase = to;
            session.updated_at = now_ms;
            match self.store.update_session(&mut session) {
                Ok(()) => {
                    debug!(session = %session.id, ?from, ?to, "session transitioned");
                    break session;
                }
                Err(StoreError::StaleVersion { .. }) if !retried => retried = true,
                Err(err) => return Err(err.into()),
            }
        };

        if to == SessionPhase::Terminated {
            self.cascade_terminate(&session, now_ms)?;
            self.publish_session(&session, SessionEventKind::Terminated, "session terminated", now_ms);
        } else {
            self.publish_session(
                &session,
                SessionEventKind::PhaseChanged,
                &format!("phase changed to {to:?}"),
                now_ms,
            );
        }
        if to.is_terminal() {
            // The session will never run again; drop its process-local
            // state. In-flight evaluations hold their own clone of the
            // cancellation flag and still see the cancel.
            if let Ok(mut cancels) = self.cancels.write() {
                cancels.remove(key);
            }
            if let Ok(mut restarts) = self.restarts.write() {
                restarts.remove(key);
            }
        }
        Ok(session)
    }

    /// Record a liveness signal. Only active or suspended sessions
    /// heartbeat.
    pub fn heartbeat(&self, key: &str, now_ms: u64) -> SessionResult<()> {
        let mut retried = false;
        loop {
            let mut session = self.load_session(key)?;
            if !matches!(session.phase, SessionPhase::Active | SessionPhase::Suspended) {
                return Err(SessionError::NotActive {
                    key: key.to_string(),
                    phase: session.phase,
                });
            }
            session.last_heartbeat = now_ms;
            session.updated_at = now_ms;
            match self.store.update_session(&mut session) {
                Ok(()) => return Ok(()),
                Err(StoreError::StaleVersion { .. }) if !retried => retried = true,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Sweep for heartbeat timeouts. A timed-out session fails; its
    /// recorded decisions are retained. With an auto-restart recovery
    /// policy and remaining budget, the session comes straight back to
    /// Active. Returns the keys that timed out this sweep.
    pub fn tick(&self, now_ms: u64) -> SessionResult<Vec<String>> {
        let mut timed_out = Vec::new();
        for session in self.store.list_sessions()? {
            if !matches!(session.phase, SessionPhase::Active | SessionPhase::Suspended) {
                continue;
            }
            if now_ms.saturating_sub(session.last_heartbeat) <= session.config.timeout_ms {
                continue;
            }
            let key = session.table_key();
            warn!(session = %session.id, "heartbeat timeout, failing session");
            let failed = self.transition_session(&key, SessionPhase::Failed, now_ms)?;
            self.publish_session(
                &failed,
                SessionEventKind::HeartbeatTimeout,
                "no heartbeat within the session timeout",
                now_ms,
            );
            timed_out.push(key.clone());

            let Some(recovery) = failed.config.recovery.clone() else {
                continue;
            };
            if !recovery.auto_restart {
                continue;
            }
            let used = self.restart_count(&key);
            if used >= recovery.max_restarts {
                debug!(session = %failed.id, used, "restart budget exhausted");
                continue;
            }
            self.bump_restarts(&key);
            self.update_session_with(&key, |s| {
                s.last_heartbeat = now_ms;
            })?;
            self.transition_session(&key, SessionPhase::Active, now_ms)?;
            info!(session = %failed.id, restart = used + 1, "session auto-restarted");
        }
        Ok(timed_out)
    }

    pub fn get_session(&self, key: &str) -> SessionResult<Option<PlacementSession>> {
        Ok(self.store.get_session(key)?)
    }

    /// The cancellation flag shared with this session's evaluations.
    pub fn cancellation(&self, key: &str) -> CancellationFlag {
        if let Ok(cancels) = self.cancels.read()
            && let Some(flag) = cancels.get(key)
        {
            return flag.clone();
        }
        let flag = CancellationFlag::new();
        if let Ok(mut cancels) = self.cancels.write() {
            return cancels.entry(key.to_string()).or_insert(flag).clone();
        }
        flag
    }

    // ── Workload admission ─────────────────────────────────────────

    /// Admit one workload into a session: evaluate candidate clusters,
    /// resolve conflicts with committed decisions, and record the
    /// placement. Returns the decision in the Decided phase.
    pub async fn admit_workload(
        &self,
        key: &str,
        workload: WorkloadRef,
        labels: &HashMap<String, String>,
        request: ResourceRequest,
        now_ms: u64,
    ) -> SessionResult<PlacementDecision> {
        let session = self.load_session(key)?;
        if session.phase != SessionPhase::Active {
            return Err(SessionError::NotActive {
                key: key.to_string(),
                phase: session.phase,
            });
        }
        if !session.workload_selector.matches(&workload.namespace, labels) {
            return Err(SessionError::Validation(format!(
                "workload {} does not match the session selector",
                workload.key()
            )));
        }
        if !session.constraints.permits(&request) {
            return Err(SessionError::Validation(format!(
                "request for {} exceeds the session resource constraints",
                workload.key()
            )));
        }
        let results = self.gate.validate(ValidationTrigger::WorkloadAdmission, &session);
        if any_blocking(&results) {
            return Err(SessionError::Validation(
                "workload admission refused by validation".to_string(),
            ));
        }

        let existing = self.store.list_decisions_for_session(&session.id)?;
        if existing.len() as u32 >= session.config.max_decisions {
            return Err(SessionError::CapacityExceeded {
                key: key.to_string(),
                max: session.config.max_decisions,
            });
        }

        let snapshots = self.fetch_snapshots(&session).await?;
        let decision_id = format!("d-{}", session.metrics.total_decisions + 1);

        // The decision and its context shell commit before evaluation,
        // so a crash mid-pipeline leaves an explainable record.
        let mut decision = PlacementDecision {
            id: decision_id.clone(),
            session_id: session.id.clone(),
            workload: workload.clone(),
            requested: request,
            target_cluster: "unscheduled".to_string(),
            score: tmc_types::Score::MIN,
            reason: format!("admitted into session {}", session.id),
            priority: session.policies.iter().map(|p| p.priority).max().unwrap_or(0),
            constraints: session
                .policies
                .iter()
                .flat_map(|p| p.constraints.iter().cloned())
                .collect(),
            anti_affinity: session
                .policies
                .iter()
                .flat_map(|p| p.anti_affinity.iter().cloned())
                .collect(),
            phase: DecisionPhase::Pending,
            context: Some(DecisionContext {
                decision_id: decision_id.clone(),
                algorithm: ALGORITHM.to_string(),
                evaluations: Vec::new(),
                applied_policies: session
                    .policies
                    .iter()
                    .map(|p| AppliedPolicy {
                        name: p.name.clone(),
                        strategy: p.strategy,
                        weight: p.weight,
                        priority: p.priority,
                    })
                    .collect(),
                alternatives: Vec::new(),
                metrics: DecisionMetrics::default(),
            }),
            rollback_policy: Some(Default::default()),
            version: 0,
            created_at: now_ms,
            updated_at: now_ms,
        };

        self.recorder.record(&mut decision)?;
        let (mut decision, _) = self.recorder.advance_phase(
            &session.id,
            &decision.id,
            DecisionPhase::Evaluating,
            now_ms,
        )?;

        let cancel = self.cancellation(key);
        let evaluations = match evaluate(
            &workload,
            &snapshots,
            &session.policies,
            &decision.requested,
            &cancel,
        ) {
            Ok(evaluations) => evaluations,
            Err(err) => {
                self.recorder.fail_decision(
                    &session.id,
                    &decision.id,
                    "evaluation cancelled",
                    now_ms,
                )?;
                self.finish_metrics(key, Settled::Failure, 0, 0)?;
                return Err(err.into());
            }
        };

        let strategy = session.policies[0].strategy;
        let Some(selection) = select_placement(&evaluations, strategy, &snapshots, &workload.class)
        else {
            let reasons: Vec<String> = evaluations
                .iter()
                .flat_map(|e| {
                    e.rejection_reasons
                        .iter()
                        .map(move |r| format!("{}: {r}", e.cluster))
                })
                .collect();
            let reason = if reasons.is_empty() {
                "no candidate clusters".to_string()
            } else {
                format!("no eligible cluster ({})", reasons.join("; "))
            };
            self.recorder
                .fail_decision(&session.id, &decision.id, &reason, now_ms)?;
            self.finish_metrics(key, Settled::Failure, 0, 0)?;
            return Err(SessionError::Scheduling {
                workload: workload.key(),
                reason,
            });
        };

        decision.target_cluster = selection.winner.cluster.clone();
        decision.score = selection.winner.score;
        decision.reason = format!(
            "scored {} on {} by {ALGORITHM}",
            u64::from(selection.winner.score),
            selection.winner.cluster
        );
        if let Some(ctx) = decision.context.as_mut() {
            ctx.evaluations = evaluations.clone();
            ctx.alternatives = selection.alternatives.clone();
            ctx.metrics = DecisionMetrics {
                clusters_evaluated: evaluations.len() as u32,
                clusters_eligible: evaluations.iter().filter(|e| e.eligible).count() as u32,
                evaluation_duration_ms: 0,
            };
        }
        decision.updated_at = now_ms;
        self.store.update_decision(&mut decision)?;

        // Conflict pass against committed decisions, over the same
        // snapshot set evaluation used.
        let committed: Vec<PlacementDecision> = if self.scope.is_some() {
            self.store.list_decisions()?
        } else {
            existing
        }
        .into_iter()
        .filter(|d| d.id != decision.id || d.session_id != decision.session_id)
        .collect();

        let conflicts = detect(&decision, &committed, &snapshots, self.scope.as_ref(), now_ms);
        let mut resolved_count = 0u64;
        let mut same_session_losses = 0u64;
        for mut conflict in conflicts {
            self.events.publish(EngineEvent::Conflict(ConflictDetected {
                conflict_id: conflict.id.clone(),
                conflict_type: conflict.conflict_type,
                decisions: conflict.decisions.clone(),
                at: now_ms,
            }));
            // The conflict record walks its own status table, so the
            // store history shows how far resolution got.
            self.store.create_conflict(&mut conflict)?;
            conflict.status = ConflictStatus::Analyzing;
            self.store.update_conflict(&mut conflict)?;

            let mode = match select_strategy(
                conflict.conflict_type,
                &session.config.conflict_resolution,
            ) {
                Ok(mode) => mode,
                Err(err) => {
                    conflict.status = ConflictStatus::Resolving;
                    self.store.update_conflict(&mut conflict)?;
                    conflict.status = ConflictStatus::Failed;
                    self.store.update_conflict(&mut conflict)?;
                    self.recorder.fail_decision(
                        &session.id,
                        &decision.id,
                        &format!("unresolvable conflict: {err}"),
                        now_ms,
                    )?;
                    self.finish_metrics(key, Settled::Failure, resolved_count, same_session_losses)?;
                    return Err(err.into());
                }
            };
            conflict.status = ConflictStatus::Resolving;
            self.store.update_conflict(&mut conflict)?;

            let contenders: Vec<PlacementDecision> = conflict
                .decisions
                .iter()
                .filter_map(|id| {
                    if *id == decision.id {
                        Some(decision.clone())
                    } else {
                        committed.iter().find(|d| &d.id == id).cloned()
                    }
                })
                .collect();
            let target_snapshot = snapshots
                .iter()
                .find(|s| s.name == decision.target_cluster);

            let outcome = resolve(&conflict, &contenders, target_snapshot, mode)?;
            conflict.status = outcome.status;
            conflict.resolution = Some(outcome.resolution.clone());
            self.store.update_conflict(&mut conflict)?;

            let mut candidate_rejection: Option<String> = None;
            for change in &outcome.changes {
                let Some(target) = contenders.iter().find(|d| d.id == change.decision_id)
                else {
                    continue;
                };
                // Committed losers that cannot legally fail terminate
                // instead; the rationale survives in the conflict
                // record either way.
                if target.phase.can_transition_to(DecisionPhase::Failed) {
                    self.recorder.fail_decision(
                        &target.session_id,
                        &target.id,
                        &change.reason,
                        now_ms,
                    )?;
                } else {
                    self.recorder.advance_phase(
                        &target.session_id,
                        &target.id,
                        DecisionPhase::Terminated,
                        now_ms,
                    )?;
                }
                if target.id == decision.id {
                    candidate_rejection = Some(change.reason.clone());
                } else if target.session_id == session.id {
                    same_session_losses += 1;
                }
            }

            if outcome.resolved() {
                resolved_count += 1;
            }
            if let Some(reason) = candidate_rejection {
                self.finish_metrics(key, Settled::Failure, resolved_count, same_session_losses)?;
                return Err(SessionError::ConflictRejected {
                    decision_id: decision.id.clone(),
                    reason,
                });
            }
            if !outcome.resolved() {
                // Unresolved: the candidate stays in Evaluating and no
                // committed decision moves.
                self.finish_metrics(key, Settled::Open, resolved_count, same_session_losses)?;
                return Err(SessionError::ConflictRejected {
                    decision_id: decision.id.clone(),
                    reason: outcome.resolution.reason,
                });
            }
        }

        let (decided, _) = self.recorder.advance_phase(
            &session.id,
            &decision.id,
            DecisionPhase::Decided,
            now_ms,
        )?;
        let updated = self.finish_metrics(key, Settled::Open, resolved_count, same_session_losses)?;
        self.publish_session(
            &updated,
            SessionEventKind::DecisionRecorded,
            &format!("decision {} placed {} on {}", decided.id, workload.key(), decided.target_cluster),
            now_ms,
        );
        info!(
            session = %session.id,
            decision = %decided.id,
            cluster = %decided.target_cluster,
            score = u64::from(decided.score),
            "workload admitted"
        );
        Ok(decided)
    }

    // ── Decision advancement ───────────────────────────────────────

    /// Advance a decision and fold terminal phases into the session
    /// metrics.
    pub fn advance_decision(
        &self,
        key: &str,
        decision_id: &str,
        to: DecisionPhase,
        now_ms: u64,
    ) -> SessionResult<PlacementDecision> {
        let session = self.load_session(key)?;
        let (advanced, transitioned) = self
            .recorder
            .advance_phase(&session.id, decision_id, to, now_ms)?;
        // The recorder reports whether this call won the write; a
        // replay or a lost race must not fold the metrics again.
        if !transitioned {
            return Ok(advanced);
        }

        let elapsed = now_ms.saturating_sub(advanced.created_at);
        match advanced.phase {
            DecisionPhase::Completed => {
                self.update_session_with(key, |s| s.metrics.record_success(elapsed))?;
            }
            DecisionPhase::Failed | DecisionPhase::RolledBack | DecisionPhase::Terminated => {
                self.update_session_with(key, |s| s.metrics.record_failure(elapsed))?;
            }
            _ => {}
        }
        Ok(advanced)
    }

    /// Fail a decision with a rationale, folding it into the metrics.
    pub fn fail_decision(
        &self,
        key: &str,
        decision_id: &str,
        reason: &str,
        now_ms: u64,
    ) -> SessionResult<PlacementDecision> {
        let session = self.load_session(key)?;
        let (failed, transitioned) = self
            .recorder
            .fail_decision(&session.id, decision_id, reason, now_ms)?;
        if transitioned {
            let elapsed = now_ms.saturating_sub(failed.created_at);
            self.update_session_with(key, |s| s.metrics.record_failure(elapsed))?;
        }
        Ok(failed)
    }

    pub fn list_decisions(&self, key: &str) -> SessionResult<Vec<PlacementDecision>> {
        let session = self.load_session(key)?;
        Ok(self.store.list_decisions_for_session(&session.id)?)
    }

    // ── Rollback integration ───────────────────────────────────────

    /// Feed one trigger observation for a decision. When the debounced
    /// trigger fires, rollback is requested through the orchestrator
    /// and the failover event published.
    pub fn observe_trigger(
        &self,
        key: &str,
        decision_id: &str,
        kind: RollbackTriggerKind,
        breached: bool,
        now_ms: u64,
    ) -> SessionResult<bool> {
        let session = self.load_session(key)?;
        let decision = self
            .recorder
            .get(&session.id, decision_id)?
            .ok_or_else(|| SessionError::NotFound(format!("{}:{decision_id}", session.id)))?;
        if decision.phase.is_terminal() {
            if let Ok(mut monitor) = self.monitor.lock() {
                monitor.forget(&decision.id);
            }
            return Ok(false);
        }
        let Some(trigger) = decision
            .rollback_policy
            .as_ref()
            .and_then(|p| p.triggers.iter().find(|t| t.kind == kind))
            .cloned()
        else {
            return Ok(false);
        };

        let fired = match self.monitor.lock() {
            Ok(mut monitor) => monitor.observe(&decision.id, &trigger, breached, now_ms),
            Err(_) => return Ok(false),
        };
        if !fired {
            return Ok(false);
        }

        match self.rollbacks.handle_trigger(&decision, kind, None, now_ms) {
            Ok((event, _op)) => {
                self.events.publish(EngineEvent::Failover(event));
                Ok(true)
            }
            Err(tmc_rollback::RollbackError::Exhausted { .. }) => {
                let elapsed = now_ms.saturating_sub(decision.created_at);
                self.update_session_with(key, |s| s.metrics.record_failure(elapsed))?;
                Ok(true)
            }
            Err(err) => Err(SessionError::Rollback(err)),
        }
    }

    /// Run a pending rollback for a decision, folding a successful
    /// reversal into the session metrics.
    pub fn execute_rollback(
        &self,
        key: &str,
        decision_id: &str,
        rollback_id: &str,
        executor: &dyn StepExecutor,
        now_ms: u64,
    ) -> SessionResult<()> {
        let session = self.load_session(key)?;
        let decision = self
            .recorder
            .get(&session.id, decision_id)?
            .ok_or_else(|| SessionError::NotFound(format!("{}:{decision_id}", session.id)))?;
        let op = self
            .rollbacks
            .execute(&decision, rollback_id, executor, now_ms)?;
        if op.status == tmc_types::RollbackStatus::Completed {
            let elapsed = now_ms.saturating_sub(decision.created_at);
            self.update_session_with(key, |s| s.metrics.record_failure(elapsed))?;
        }
        Ok(())
    }

    // ── Internals ──────────────────────────────────────────────────

    fn load_session(&self, key: &str) -> SessionResult<PlacementSession> {
        self.store
            .get_session(key)?
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    async fn fetch_snapshots(
        &self,
        session: &PlacementSession,
    ) -> SessionResult<Vec<tmc_types::ClusterSnapshot>> {
        let retry = &session.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.snapshots.snapshots(&session.cluster_selector) {
                Ok(snapshots) => return Ok(snapshots),
                Err(err) => {
                    if attempt >= retry.max_retries {
                        return Err(SessionError::RetriesExhausted {
                            attempts: attempt + 1,
                            last: err.to_string(),
                        });
                    }
                    let delay = retry.delay_for(attempt);
                    warn!(
                        session = %session.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "snapshot fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Terminate open decisions and cancel in-flight evaluation.
    fn cascade_terminate(&self, session: &PlacementSession, now_ms: u64) -> SessionResult<()> {
        self.cancellation(&session.table_key()).cancel();
        let mut terminated = 0u64;
        for decision in self.store.list_decisions_for_session(&session.id)? {
            if decision.phase.is_terminal() {
                continue;
            }
            let (_, transitioned) = self.recorder.advance_phase(
                &session.id,
                &decision.id,
                DecisionPhase::Terminated,
                now_ms,
            )?;
            if transitioned {
                terminated += 1;
            }
        }
        if terminated > 0 {
            self.update_session_with(&session.table_key(), |s| {
                for _ in 0..terminated {
                    s.metrics.record_failure(0);
                }
            })?;
            info!(session = %session.id, terminated, "open decisions terminated");
        }
        Ok(())
    }

    fn finish_metrics(
        &self,
        key: &str,
        settled: Settled,
        resolved: u64,
        same_session_losses: u64,
    ) -> SessionResult<PlacementSession> {
        self.update_session_with(key, |s| {
            s.metrics.record_admission();
            match settled {
                Settled::Failure => s.metrics.record_failure(0),
                Settled::Open => {}
            }
            for _ in 0..resolved {
                s.metrics.record_conflict_resolved();
            }
            for _ in 0..same_session_losses {
                s.metrics.record_failure(0);
            }
        })
    }

    fn update_session_with(
        &self,
        key: &str,
        apply: impl Fn(&mut PlacementSession),
    ) -> SessionResult<PlacementSession> {
        let mut retried = false;
        loop {
            let mut session = self.load_session(key)?;
            apply(&mut session);
            match self.store.update_session(&mut session) {
                Ok(()) => return Ok(session),
                Err(StoreError::StaleVersion { .. }) if !retried => retried = true,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn publish_session(
        &self,
        session: &PlacementSession,
        kind: SessionEventKind,
        message: &str,
        now_ms: u64,
    ) {
        self.events.publish(EngineEvent::Session(SessionEvent {
            session_id: session.id.clone(),
            kind,
            phase: session.phase,
            message: message.to_string(),
            at: now_ms,
        }));
    }

    fn restart_count(&self, key: &str) -> u32 {
        self.restarts
            .read()
            .ok()
            .and_then(|m| m.get(key).copied())
            .unwrap_or(0)
    }

    fn bump_restarts(&self, key: &str) {
        if let Ok(mut m) = self.restarts.write() {
            *m.entry(key.to_string()).or_insert(0) += 1;
        }
    }
}

/// How the admission pipeline left the candidate decision.
#[derive(Clone, Copy)]
enum Settled {
    /// Still open (Evaluating or Decided).
    Open,
    /// Reached Failed during admission.
    Failure,
}
