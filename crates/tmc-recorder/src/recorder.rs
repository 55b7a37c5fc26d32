//! Durable decision recording on top of the entity store.
//!
//! The recorder is the single write path for placement decisions. It
//! enforces the record invariants (a decision always carries its
//! rationale and evaluation context) and drives phase advancement
//! through the legal transition table with compare-and-swap updates.
//! A stale write is retried once against the re-read record, so two
//! components advancing the same decision settle deterministically.

use tracing::{debug, warn};

use tmc_store::{EntityStore, StoreError};
use tmc_types::{DecisionPhase, PlacementDecision};

use crate::error::{RecorderError, RecorderResult};

#[derive(Clone)]
pub struct DecisionRecorder {
    store: EntityStore,
}

impl DecisionRecorder {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Persist a freshly evaluated decision together with its context.
    ///
    /// The decision and its evaluation context commit in one write, so
    /// a recorded decision can always explain itself.
    pub fn record(&self, decision: &mut PlacementDecision) -> RecorderResult<()> {
        if decision.id.is_empty() || decision.session_id.is_empty() {
            return Err(RecorderError::InvalidRecord(
                "decision id and session id are required".to_string(),
            ));
        }
        if decision.target_cluster.is_empty() {
            return Err(RecorderError::InvalidRecord(format!(
                "decision {} has no target cluster",
                decision.id
            )));
        }
        if decision.reason.is_empty() {
            return Err(RecorderError::InvalidRecord(format!(
                "decision {} has no rationale",
                decision.id
            )));
        }
        match &decision.context {
            None => {
                return Err(RecorderError::InvalidRecord(format!(
                    "decision {} has no evaluation context",
                    decision.id
                )));
            }
            Some(ctx) if ctx.decision_id != decision.id => {
                return Err(RecorderError::InvalidRecord(format!(
                    "context belongs to {} but decision is {}",
                    ctx.decision_id, decision.id
                )));
            }
            Some(_) => {}
        }

        self.store.create_decision(decision)?;
        debug!(
            decision = %decision.id,
            session = %decision.session_id,
            cluster = %decision.target_cluster,
            "decision recorded"
        );
        Ok(())
    }

    /// Advance a decision to `to`, validating against the transition
    /// table. Re-delivery of the same advancement is a no-op. The flag
    /// reports whether this call performed the write: a replay or a
    /// lost race to the same phase returns `false`, so callers fold
    /// side effects at most once per transition.
    pub fn advance_phase(
        &self,
        session_id: &str,
        decision_id: &str,
        to: DecisionPhase,
        now_ms: u64,
    ) -> RecorderResult<(PlacementDecision, bool)> {
        self.mutate(session_id, decision_id, to, None, now_ms)
    }

    /// Fail a decision with a non-empty rationale.
    pub fn fail_decision(
        &self,
        session_id: &str,
        decision_id: &str,
        reason: &str,
        now_ms: u64,
    ) -> RecorderResult<(PlacementDecision, bool)> {
        if reason.is_empty() {
            return Err(RecorderError::InvalidRecord(format!(
                "refusing to fail decision {decision_id} without a reason"
            )));
        }
        self.mutate(session_id, decision_id, DecisionPhase::Failed, Some(reason), now_ms)
    }

    /// Load a decision by session and id.
    pub fn get(
        &self,
        session_id: &str,
        decision_id: &str,
    ) -> RecorderResult<Option<PlacementDecision>> {
        Ok(self.store.get_decision(&key_of(session_id, decision_id))?)
    }

    fn mutate(
        &self,
        session_id: &str,
        decision_id: &str,
        to: DecisionPhase,
        reason: Option<&str>,
        now_ms: u64,
    ) -> RecorderResult<(PlacementDecision, bool)> {
        let key = key_of(session_id, decision_id);
        let mut retried = false;
        loop {
            let mut decision = self
                .store
                .get_decision(&key)?
                .ok_or_else(|| RecorderError::NotFound(key.clone()))?;

            // Idempotent replay: already there, nothing to write.
            if decision.phase == to {
                return Ok((decision, false));
            }
            if !decision.phase.can_transition_to(to) {
                return Err(RecorderError::InvalidTransition {
                    key,
                    from: decision.phase,
                    to,
                });
            }

            let from = decision.phase;
            decision.phase = to;
            if let Some(reason) = reason {
                decision.reason = reason.to_string();
            }
            decision.updated_at = now_ms;

            match self.store.update_decision(&mut decision) {
                Ok(()) => {
                    debug!(decision = %decision_id, ?from, ?to, "decision advanced");
                    return Ok((decision, true));
                }
                Err(StoreError::StaleVersion { .. }) if !retried => {
                    // Someone advanced it first. Re-read and re-check
                    // the transition against the new phase.
                    warn!(decision = %decision_id, "stale decision write, re-reading");
                    retried = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn key_of(session_id: &str, decision_id: &str) -> String {
    format!("{session_id}:{decision_id}")
}
