//! Rollback orchestration: budget checks, operation records, and
//! step-by-step execution.
//!
//! The orchestrator decides whether a rollback may run (decision phase,
//! auto-rollback setting, attempt budget), persists the operation
//! record, and walks its steps through a caller-supplied executor. The
//! executor is the seam to the actual cluster plumbing; tests plug in
//! fakes.

use tracing::{info, warn};

use tmc_recorder::DecisionRecorder;
use tmc_store::EntityStore;
use tmc_types::{
    DecisionPhase, FailoverEvent, PlacementDecision, RollbackOperation, RollbackStatus,
    RollbackStep, RollbackTriggerKind, StepStatus,
};

use crate::error::{RollbackError, RollbackResult};

/// Ordered steps of every rollback operation.
const STEPS: [&str; 3] = ["drain-workload", "release-capacity", "redeploy-workload"];

/// Runs one rollback step against the placement substrate.
pub trait StepExecutor {
    fn run_step(&self, op: &RollbackOperation, step: &RollbackStep) -> anyhow::Result<()>;
}

pub struct RollbackOrchestrator {
    store: EntityStore,
    recorder: DecisionRecorder,
}

impl RollbackOrchestrator {
    pub fn new(store: EntityStore) -> Self {
        let recorder = DecisionRecorder::new(store.clone());
        Self { store, recorder }
    }

    /// Create a pending operation for an explicit operator request.
    ///
    /// Manual rollbacks are not counted against the automatic attempt
    /// budget and run even when auto-rollback is off.
    pub fn request_manual(
        &self,
        decision: &PlacementDecision,
        target_cluster: Option<String>,
        now_ms: u64,
    ) -> RollbackResult<RollbackOperation> {
        self.check_rollbackable(decision)?;
        self.create_operation(decision, RollbackTriggerKind::Manual, target_cluster, now_ms)
    }

    /// React to a fired trigger. Always returns the failover event for
    /// the audit trail; the operation is present only when a rollback
    /// was actually admitted.
    pub fn handle_trigger(
        &self,
        decision: &PlacementDecision,
        kind: RollbackTriggerKind,
        target_cluster: Option<String>,
        now_ms: u64,
    ) -> RollbackResult<(FailoverEvent, Option<RollbackOperation>)> {
        let policy = decision.rollback_policy.clone().unwrap_or_default();
        let mut event = FailoverEvent {
            decision_id: decision.id.clone(),
            trigger: kind,
            from_cluster: decision.target_cluster.clone(),
            to_cluster: target_cluster.clone(),
            executed: false,
            at: now_ms,
        };

        if !policy.auto_rollback {
            info!(decision = %decision.id, ?kind, "trigger fired, auto-rollback off");
            return Ok((event, None));
        }
        self.check_rollbackable(decision)?;

        let attempts = self
            .store
            .list_rollbacks_for_decision(&decision.id)?
            .len() as u32;
        if attempts >= policy.max_failover_attempts {
            warn!(
                decision = %decision.id,
                attempts,
                "rollback budget exhausted, failing decision"
            );
            self.recorder.fail_decision(
                &decision.session_id,
                &decision.id,
                "rollback budget exhausted",
                now_ms,
            )?;
            return Err(RollbackError::Exhausted {
                decision_id: decision.id.clone(),
                attempts,
            });
        }

        let op = self.create_operation(decision, kind, target_cluster, now_ms)?;
        event.executed = true;
        Ok((event, Some(op)))
    }

    /// Run a pending operation's steps in order.
    ///
    /// A failed step skips the remainder and fails the operation; the
    /// step's error detail is kept only when the decision's policy
    /// retains history. Success moves the decision to rolled-back.
    pub fn execute(
        &self,
        decision: &PlacementDecision,
        rollback_id: &str,
        executor: &dyn StepExecutor,
        now_ms: u64,
    ) -> RollbackResult<RollbackOperation> {
        let key = format!("{}:{}", decision.id, rollback_id);
        let mut op = self
            .store
            .get_rollback(&key)?
            .ok_or_else(|| RollbackError::NotFound(key.clone()))?;
        if op.status != RollbackStatus::Pending {
            return Err(RollbackError::InvalidStatus {
                id: op.id.clone(),
                from: op.status,
                to: RollbackStatus::InProgress,
            });
        }
        let retain_history = decision
            .rollback_policy
            .as_ref()
            .map(|p| p.retain_history)
            .unwrap_or(true);

        op.status = RollbackStatus::InProgress;
        op.started_at = Some(now_ms);
        self.store.update_rollback(&mut op)?;

        let mut failed = false;
        for i in 0..op.steps.len() {
            if failed {
                op.steps[i].status = StepStatus::Skipped;
                continue;
            }
            op.steps[i].status = StepStatus::Running;
            let step = op.steps[i].clone();
            match executor.run_step(&op, &step) {
                Ok(()) => op.steps[i].status = StepStatus::Completed,
                Err(err) => {
                    warn!(
                        rollback = %op.id,
                        step = %op.steps[i].name,
                        error = %err,
                        "rollback step failed"
                    );
                    op.steps[i].status = StepStatus::Failed;
                    if retain_history {
                        op.steps[i].error = Some(err.to_string());
                    }
                    failed = true;
                }
            }
        }

        op.status = if failed {
            RollbackStatus::Failed
        } else {
            RollbackStatus::Completed
        };
        op.completed_at = Some(now_ms);
        self.store.update_rollback(&mut op)?;

        if !failed {
            self.recorder.advance_phase(
                &decision.session_id,
                &decision.id,
                DecisionPhase::RolledBack,
                now_ms,
            )?;
            info!(rollback = %op.id, decision = %decision.id, "rollback completed");
        }
        Ok(op)
    }

    /// Cancel an operation that has not finished.
    pub fn cancel(
        &self,
        decision_id: &str,
        rollback_id: &str,
        now_ms: u64,
    ) -> RollbackResult<RollbackOperation> {
        let key = format!("{decision_id}:{rollback_id}");
        let mut op = self
            .store
            .get_rollback(&key)?
            .ok_or_else(|| RollbackError::NotFound(key.clone()))?;
        if !op.status.can_transition_to(RollbackStatus::Cancelled) {
            return Err(RollbackError::InvalidStatus {
                id: op.id.clone(),
                from: op.status,
                to: RollbackStatus::Cancelled,
            });
        }
        op.status = RollbackStatus::Cancelled;
        op.completed_at = Some(now_ms);
        self.store.update_rollback(&mut op)?;
        Ok(op)
    }

    pub fn attempts(&self, decision_id: &str) -> RollbackResult<u32> {
        Ok(self.store.list_rollbacks_for_decision(decision_id)?.len() as u32)
    }

    fn check_rollbackable(&self, decision: &PlacementDecision) -> RollbackResult<()> {
        if !matches!(
            decision.phase,
            DecisionPhase::Executing | DecisionPhase::Active
        ) {
            return Err(RollbackError::NotRollbackable {
                decision_id: decision.id.clone(),
                phase: decision.phase,
            });
        }
        Ok(())
    }

    fn create_operation(
        &self,
        decision: &PlacementDecision,
        trigger: RollbackTriggerKind,
        target_cluster: Option<String>,
        now_ms: u64,
    ) -> RollbackResult<RollbackOperation> {
        let seq = self.attempts(&decision.id)? + 1;
        let mut op = RollbackOperation {
            id: format!("rb-{}-{seq}", decision.id),
            decision_id: decision.id.clone(),
            trigger,
            source_cluster: decision.target_cluster.clone(),
            target_cluster,
            steps: STEPS.iter().map(|s| RollbackStep::pending(s)).collect(),
            status: RollbackStatus::Pending,
            started_at: None,
            completed_at: None,
            version: 0,
            created_at: now_ms,
        };
        self.store.create_rollback(&mut op)?;
        info!(rollback = %op.id, decision = %decision.id, ?trigger, "rollback requested");
        Ok(op)
    }
}
