//! SQLite-backed durability for the in-memory store.

mod snapshot_store;

pub use snapshot_store::{SnapshotStoreError, SqliteSnapshotStore};
