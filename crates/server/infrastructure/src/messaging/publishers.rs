use async_trait::async_trait;
use esign_server_domain::outbox::{OutboxMessage, OutboxPublisher, PublishError};
use tokio::sync::mpsc;
use tracing::info;

use crate::observability::correlation_id_of;

/// Logs each message and reports success. Used when no broker is wired.
#[derive(Debug, Clone, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl OutboxPublisher for LoggingPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        info!(
            message_id = %message.id,
            topic = %message.topic,
            message_key = %message.message_key,
            attempt = message.attempt_count,
            correlation_id = correlation_id_of(message).unwrap_or("-"),
            "Outbox message published"
        );
        Ok(())
    }
}

/// Forwards messages to an in-process consumer over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<OutboxMessage>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboxMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl OutboxPublisher for ChannelPublisher {
    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| PublishError::new(format!("consumer for {} is gone", message.topic)))
    }
}
