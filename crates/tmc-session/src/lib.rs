//! tmc-session — session lifecycle and the workload admission pipeline.
//!
//! The [`SessionManager`] owns the end-to-end flow: validate and
//! persist sessions, admit workloads (evaluate candidate clusters,
//! resolve conflicts with committed decisions, record the placement),
//! sweep heartbeats, and bridge fired rollback triggers into the
//! orchestrator. External systems plug in at three seams:
//! [`ClusterSnapshotProvider`], [`ValidationGate`], and [`EventSink`].

pub mod error;
pub mod manager;
pub mod traits;

pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use traits::{
    AllowAllGate, ClusterSnapshotProvider, EventSink, StaticSnapshotProvider,
    StoreSnapshotProvider, TracingEventSink, ValidationGate,
};
