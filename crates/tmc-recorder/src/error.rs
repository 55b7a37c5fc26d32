use thiserror::Error;

use tmc_store::StoreError;
use tmc_types::DecisionPhase;

/// Errors from recording and advancing decisions.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("invalid decision record: {0}")]
    InvalidRecord(String),

    #[error("decision {0} not found")]
    NotFound(String),

    #[error("invalid decision transition {from:?} -> {to:?} for {key}")]
    InvalidTransition {
        key: String,
        from: DecisionPhase,
        to: DecisionPhase,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RecorderResult<T> = Result<T, RecorderError>;
