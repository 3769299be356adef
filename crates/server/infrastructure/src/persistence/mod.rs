//! Persistence adapters
//!
//! [`memory::InMemoryStore`] holds the whole store as one serializable
//! [`memory::StoreState`]. Transactions work on a private copy of that state
//! and swap it in on commit. [`sqlite::SqliteSnapshotStore`] wraps the
//! in-memory store and writes the state to a single SQLite row after every
//! committed write.

pub mod memory;
pub mod sqlite;
