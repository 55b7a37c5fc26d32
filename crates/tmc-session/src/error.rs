use thiserror::Error;

use tmc_conflict::ResolverError;
use tmc_evaluator::EvaluatorError;
use tmc_recorder::RecorderError;
use tmc_rollback::RollbackError;
use tmc_store::StoreError;
use tmc_types::SessionPhase;

/// Errors from session lifecycle and workload admission.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session: {0}")]
    Validation(String),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("invalid session transition {from:?} -> {to:?} for {key}")]
    InvalidTransition {
        key: String,
        from: SessionPhase,
        to: SessionPhase,
    },

    #[error("session {key} is {phase:?}, operation requires an active session")]
    NotActive { key: String, phase: SessionPhase },

    #[error("session {key} at its decision capacity ({max})")]
    CapacityExceeded { key: String, max: u32 },

    #[error("scheduling failed for {workload}: {reason}")]
    Scheduling { workload: String, reason: String },

    #[error("cluster snapshots unavailable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("conflict resolution rejected decision {decision_id}: {reason}")]
    ConflictRejected { decision_id: String, reason: String },

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;
