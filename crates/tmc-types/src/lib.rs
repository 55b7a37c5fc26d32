//! tmc-types — canonical entity model for the TMC placement engine.
//!
//! Every entity the engine reads and writes lives here: placement
//! sessions, decisions with their evaluation context, conflicts,
//! rollback operations, affinity and validation policies, and cluster
//! registrations. All types are serializable to/from JSON for storage
//! in the entity store.
//!
//! # Conventions
//!
//! - Lifecycle enums carry an explicit transition table
//!   (`allowed_transitions` / `can_transition_to`) so tests can
//!   enumerate every edge mechanically.
//! - Scores and criterion weights are validated at construction
//!   ([`Score::new`] fails outside 0..=100, never clamps).
//! - Entities that support concurrent writers carry a `version` field
//!   for compare-and-swap updates in the store.

pub mod affinity;
pub mod cluster;
pub mod conflict;
pub mod decision;
pub mod event;
pub mod policy;
pub mod rollback;
pub mod score;
pub mod selector;
pub mod session;
pub mod validation;

pub use affinity::{FailoverPolicy, FailoverStrategy, SessionAffinityPolicy, StickinessStrength};
pub use cluster::{
    ClusterCapacity, ClusterCondition, ClusterRegistration, ClusterSnapshot, Taint,
};
pub use conflict::{
    Conflict, ConflictDetectionScope, ConflictResolution, ConflictStatus, ConflictSummary,
    ConflictType,
};
pub use decision::{
    AlternativePlacement, AppliedPolicy, ClusterEvaluation, DecisionContext, DecisionMetrics,
    DecisionPhase, EvaluationCriterion, PlacementDecision,
};
pub use event::{ConflictDetected, EngineEvent, FailoverEvent, SessionEvent, SessionEventKind};
pub use policy::{
    AntiAffinityTerm, ConflictResolutionMode, ConflictResolutionStrategy, ConstraintKind,
    PlacementConstraint, PlacementPolicy, PlacementStrategy, ResourceConstraints,
    ResourceRequest, RetryPolicy,
};
pub use rollback::{
    RollbackOperation, RollbackPolicy, RollbackStatus, RollbackStep, RollbackTrigger,
    RollbackTriggerKind, StepStatus,
};
pub use score::{Score, ScoreOutOfRange, Weight};
pub use selector::{ClusterSelector, WorkloadRef, WorkloadSelector};
pub use session::{
    PersistenceStrategy, PlacementSession, RecoveryPolicy, SessionConfig, SessionMetrics,
    SessionPhase,
};
pub use validation::{
    ValidationOutcome, ValidationResult, ValidationRule, ValidationRuleType, ValidationSeverity,
    ValidationTrigger, any_blocking,
};

/// Unique identifier for a placement session (namespace-scoped).
pub type SessionId = String;

/// Unique identifier for a placement decision within a session.
pub type DecisionId = String;

/// Registered cluster name.
pub type ClusterName = String;

/// Unique identifier for a detected conflict.
pub type ConflictId = String;

/// Unique identifier for a rollback operation.
pub type RollbackId = String;
