//! tmc-conflict — conflict detection and resolution for placements.
//!
//! Detection compares a proposed decision against committed decisions
//! over a consistent snapshot; resolution applies the session's
//! configured strategy (override, merge, or fail) and computes the
//! decision phase changes for the session manager to persist. Both
//! halves are pure functions so they test without a store.

pub mod detector;
pub mod resolver;

pub use detector::detect;
pub use resolver::{
    resolve, select_strategy, validate_strategies, DecisionChange, ResolutionOutcome,
    ResolverError,
};
