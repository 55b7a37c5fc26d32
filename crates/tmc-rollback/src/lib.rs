//! tmc-rollback — trigger debounce and rollback orchestration.
//!
//! Two halves: the [`TriggerMonitor`] decides when a sustained metric
//! breach should fire, and the [`RollbackOrchestrator`] turns a fired
//! trigger (or an operator request) into a persisted operation and
//! walks its steps through a pluggable [`StepExecutor`].

pub mod error;
pub mod monitor;
pub mod orchestrator;

pub use error::{RollbackError, RollbackResult};
pub use monitor::TriggerMonitor;
pub use orchestrator::{RollbackOrchestrator, StepExecutor};
