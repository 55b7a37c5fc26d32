//! tmc-store — embedded entity store for the TMC placement engine.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and
//! in-memory storage for sessions, decisions, cluster registrations,
//! conflicts, and rollback operations.
//!
//! # Architecture
//!
//! All entities are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{session_id}:{decision_id}`)
//! enable efficient prefix scans for owned records.
//!
//! Every update is a compare-and-swap on the entity's `version` field,
//! which is what serializes concurrent phase-transition writers: only
//! one of two racing writers commits, the other sees `StaleVersion`
//! and must re-read.
//!
//! The `EntityStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across async tasks. Committed
//! writes are published on a best-effort broadcast channel
//! ([`EntityStore::subscribe`]).

pub mod error;
pub mod events;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use events::{ChangeOp, EntityKind, StoreEvent};
pub use store::EntityStore;
