//! Infrastructure Layer
//!
//! Store implementations and adapters for the e-sign persistence core:
//! - persistence: in-memory store, transaction surfaces, SQLite snapshots
//! - credentials: AES-256-GCM credential vault
//! - messaging: outbox publishers
//! - observability: tracing subscriber setup

pub mod credentials;
pub mod messaging;
pub mod observability;
pub mod persistence;

pub use persistence::memory::{InMemoryStore, MemoryTx};
pub use persistence::sqlite::SqliteSnapshotStore;
