//! Transactional Outbox
//!
//! Side-effect messages are written inside the business transaction and
//! dispatched after commit by a claim, publish, settle loop.

pub mod model;
pub mod publisher;
pub mod repository;

pub use model::{
    ClaimRequest, DEFAULT_RETRY_DELAY_SECS, NewOutboxMessage, OutboxMessage, OutboxQuery,
    OutboxStatus,
};
pub use publisher::{OutboxPublisher, PublishError};
pub use repository::{OutboxRepository, OutboxStats};
