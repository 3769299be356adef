//! Outbox publishers
//!
//! Adapters implementing the domain `OutboxPublisher` port. Broker-backed
//! publishers live outside this crate; these cover local delivery and
//! development runs.

mod publishers;

pub use publishers::{ChannelPublisher, LoggingPublisher};
