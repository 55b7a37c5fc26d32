//! redb table definitions for the TMC entity store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! entities). Composite keys follow `{namespace}/{name}` or
//! `{parent_id}:{child_id}` so related records share a prefix.

use redb::TableDefinition;

/// Placement sessions keyed by `{namespace}/{name}`.
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Placement decisions keyed by `{session_id}:{decision_id}`.
pub const DECISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("decisions");

/// Cluster registrations keyed by `{cluster_name}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Conflicts keyed by `{conflict_id}`.
pub const CONFLICTS: TableDefinition<&str, &[u8]> = TableDefinition::new("conflicts");

/// Rollback operations keyed by `{decision_id}:{rollback_id}`.
pub const ROLLBACKS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollbacks");
