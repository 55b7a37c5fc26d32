//! Change notifications for store writes.
//!
//! Every committed write publishes a [`StoreEvent`] on a tokio
//! broadcast channel. Delivery is best-effort: a send with no (or
//! lagging) receivers is dropped silently, so notification can never
//! block or fail a state-machine write.

use serde::{Deserialize, Serialize};

/// Which entity family a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Session,
    Decision,
    Cluster,
    Conflict,
    Rollback,
}

/// What happened to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

/// A committed change to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub kind: EntityKind,
    pub key: String,
    pub op: ChangeOp,
}
