//! Publisher port consumed by the outbox dispatcher.

use async_trait::async_trait;

use super::model::OutboxMessage;

/// Error returned by a publisher. The dispatcher does not inspect it beyond
/// recording its message as `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PublishError {
    pub message: String,
}

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Delivers claimed messages to the outside world. Implementations should
/// deduplicate on `message_key`: delivery is at-least-once.
#[async_trait]
pub trait OutboxPublisher: Send + Sync {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError>;
}
