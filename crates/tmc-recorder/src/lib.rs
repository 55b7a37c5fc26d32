//! tmc-recorder — the single write path for placement decisions.
//!
//! Wraps the entity store with the record invariants (every decision
//! carries a rationale and its evaluation context) and drives phase
//! advancement through the legal transition table. Stale writes are
//! retried once against the re-read record.

pub mod error;
pub mod recorder;

pub use error::{RecorderError, RecorderResult};
pub use recorder::DecisionRecorder;
