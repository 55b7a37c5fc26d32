use thiserror::Error;

use tmc_recorder::RecorderError;
use tmc_store::StoreError;
use tmc_types::{DecisionPhase, RollbackStatus};

/// Errors from rollback orchestration.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("decision {decision_id} is {phase:?}, not executing or active")]
    NotRollbackable {
        decision_id: String,
        phase: DecisionPhase,
    },

    #[error("rollback budget exhausted for decision {decision_id}: {attempts} attempts")]
    Exhausted { decision_id: String, attempts: u32 },

    #[error("rollback {0} not found")]
    NotFound(String),

    #[error("rollback {id} is {from:?}, cannot move to {to:?}")]
    InvalidStatus {
        id: String,
        from: RollbackStatus,
        to: RollbackStatus,
    },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RollbackResult<T> = Result<T, RollbackError>;
