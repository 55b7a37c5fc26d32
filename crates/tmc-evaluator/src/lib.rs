//! tmc-evaluator — cluster scoring for placement decisions.
//!
//! This crate evaluates candidate clusters for one workload against a
//! session's policies and constraints. It does NOT talk to clusters or
//! the entity store: the caller supplies a cached capacity/health
//! snapshot, so evaluation is pure and side-effect-free.
//!
//! # Components
//!
//! - **`scorer`** — per-cluster weighted criteria and the truncating
//!   weighted mean
//! - **`evaluate`** — the candidate-set pass, strategy tie-breaking,
//!   and winner/alternative selection
//! - **`cancel`** — cooperative cancellation between candidates

pub mod cancel;
pub mod evaluate;
pub mod scorer;

pub use cancel::CancellationFlag;
pub use evaluate::{ALGORITHM, EvaluatorError, Selection, evaluate, select_placement};
pub use scorer::{evaluate_cluster, weighted_score};
