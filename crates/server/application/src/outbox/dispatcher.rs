//! Outbox Dispatcher
//!
//! One dispatch batch claims due rows, hands each to the publisher and
//! settles it. Publish failures are recovered here: the row is scheduled for
//! retry or failed terminally once its attempt budget is spent. Only
//! settlement errors reach the caller, joined into [`DispatchResult::errors`].

use chrono::{DateTime, Duration, Utc};
use esign_server_domain::outbox::{
    ClaimRequest, DEFAULT_RETRY_DELAY_SECS, OutboxMessage, OutboxPublisher, OutboxRepository,
    OutboxStatus,
};
use esign_server_domain::{DomainError, Result, Scope};
use esign_shared::config::OutboxConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Parameters of one dispatch batch
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub scope: Scope,
    /// Written to `locked_by` on claimed rows
    pub consumer: String,
    pub limit: usize,
    pub topic: Option<String>,
    pub now: DateTime<Utc>,
    /// Non-positive selects the 30 second default.
    pub retry_delay: Duration,
}

impl DispatchRequest {
    pub fn new(scope: Scope, consumer: impl Into<String>, limit: usize) -> Self {
        Self {
            scope,
            consumer: consumer.into(),
            limit,
            topic: None,
            now: Utc::now(),
            retry_delay: Duration::seconds(DEFAULT_RETRY_DELAY_SECS),
        }
    }

    pub fn from_config(scope: Scope, config: &OutboxConfig) -> Self {
        Self::new(scope, config.consumer.clone(), config.batch_size)
            .with_retry_delay(Duration::seconds(config.retry_delay_secs as i64))
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn effective_retry_delay(&self) -> Duration {
        if self.retry_delay <= Duration::zero() {
            Duration::seconds(DEFAULT_RETRY_DELAY_SECS)
        } else {
            self.retry_delay
        }
    }
}

/// Counts for one dispatch batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchResult {
    pub claimed: usize,
    pub published: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Settlement errors; the batch keeps going past them
    #[serde(skip)]
    pub errors: Vec<DomainError>,
}

impl DispatchResult {
    /// Settlement errors joined into one, if any
    pub fn error(&self) -> Option<DomainError> {
        DomainError::join(self.errors.iter().cloned())
    }

    pub fn into_result(self) -> Result<Self> {
        match self.error() {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    pub fn merge(&mut self, other: DispatchResult) {
        self.claimed += other.claimed;
        self.published += other.published;
        self.retrying += other.retrying;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Claim, publish, settle
pub struct OutboxDispatcher<S: ?Sized, P: ?Sized> {
    store: Arc<S>,
    publisher: Arc<P>,
    publish_timeout: StdDuration,
}

impl<S: ?Sized, P: ?Sized> Clone for OutboxDispatcher<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            publish_timeout: self.publish_timeout,
        }
    }
}

impl<S, P> OutboxDispatcher<S, P>
where
    S: OutboxRepository + ?Sized,
    P: OutboxPublisher + ?Sized,
{
    pub const DEFAULT_PUBLISH_TIMEOUT: StdDuration = StdDuration::from_secs(10);

    pub fn new(store: Arc<S>, publisher: Arc<P>) -> Self {
        Self {
            store,
            publisher,
            publish_timeout: Self::DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: StdDuration) -> Self {
        if !timeout.is_zero() {
            self.publish_timeout = timeout;
        }
        self
    }

    pub async fn dispatch_batch(&self, request: DispatchRequest) -> Result<DispatchResult> {
        let claimed = self
            .store
            .claim_outbox(
                &request.scope,
                ClaimRequest {
                    consumer: request.consumer.clone(),
                    limit: request.limit,
                    topic: request.topic.clone(),
                    now: request.now,
                },
            )
            .await?;

        let mut result = DispatchResult {
            claimed: claimed.len(),
            ..DispatchResult::default()
        };
        if claimed.is_empty() {
            debug!(consumer = %request.consumer, "No outbox messages due");
            return Ok(result);
        }

        let retry_at = request.now + request.effective_retry_delay();
        for message in claimed {
            match self.publish(&message).await {
                Ok(()) => match self
                    .store
                    .mark_outbox_succeeded(
                        &request.scope,
                        &message.id,
                        &request.consumer,
                        request.now,
                    )
                    .await
                {
                    Ok(_) => result.published += 1,
                    Err(err) => result.errors.push(err),
                },
                Err(reason) => {
                    warn!(
                        message_id = %message.id,
                        topic = %message.topic,
                        attempt = message.attempt_count,
                        error = %reason,
                        "Outbox publish failed"
                    );
                    match self
                        .store
                        .mark_outbox_failed(
                            &request.scope,
                            &message.id,
                            &request.consumer,
                            &reason,
                            Some(retry_at),
                            request.now,
                        )
                        .await
                    {
                        Ok(settled) if settled.status == OutboxStatus::Failed => result.failed += 1,
                        Ok(_) => result.retrying += 1,
                        Err(err) => result.errors.push(err),
                    }
                }
            }
        }

        info!(
            consumer = %request.consumer,
            claimed = result.claimed,
            published = result.published,
            retrying = result.retrying,
            failed = result.failed,
            "Outbox batch dispatched"
        );
        Ok(result)
    }

    async fn publish(&self, message: &OutboxMessage) -> std::result::Result<(), String> {
        match tokio::time::timeout(self.publish_timeout, self.publisher.publish(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "publish timed out after {}ms",
                self.publish_timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use esign_server_domain::outbox::{NewOutboxMessage, OutboxQuery, PublishError};
    use esign_server_infrastructure::InMemoryStore;
    use parking_lot::Mutex;

    /// Fails every message whose key is listed, records the rest.
    #[derive(Default)]
    struct ScriptedPublisher {
        failing: Vec<&'static str>,
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OutboxPublisher for ScriptedPublisher {
        async fn publish(&self, message: &OutboxMessage) -> std::result::Result<(), PublishError> {
            if self.failing.contains(&message.message_key.as_str()) {
                return Err(PublishError::new("smtp timeout"));
            }
            self.published.lock().push(message.message_key.clone());
            Ok(())
        }
    }

    struct StalledPublisher;

    #[async_trait]
    impl OutboxPublisher for StalledPublisher {
        async fn publish(&self, _message: &OutboxMessage) -> std::result::Result<(), PublishError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn scope() -> Scope {
        Scope::new("tenant-1", "org-1")
    }

    async fn enqueue(store: &InMemoryStore, key: &str, at: DateTime<Utc>) {
        store
            .enqueue_outbox(
                &scope(),
                NewOutboxMessage::new("email.send", key, serde_json::json!({"key": key}))
                    .available_at(at),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_non_positive_retry_delay_uses_default() {
        let request =
            DispatchRequest::new(scope(), "worker-1", 10).with_retry_delay(Duration::zero());
        assert_eq!(request.effective_retry_delay(), Duration::seconds(30));
        let request = request.with_retry_delay(Duration::seconds(-5));
        assert_eq!(request.effective_retry_delay(), Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();
        for key in ["a", "b", "c"] {
            enqueue(&store, key, t0).await;
        }
        let publisher = Arc::new(ScriptedPublisher {
            failing: vec!["b"],
            ..Default::default()
        });
        let dispatcher = OutboxDispatcher::new(store.clone(), publisher.clone());

        let result = dispatcher
            .dispatch_batch(DispatchRequest::new(scope(), "worker-1", 10).at(t0))
            .await
            .unwrap();

        assert_eq!(
            (result.claimed, result.published, result.retrying, result.failed),
            (3, 2, 1, 0)
        );
        assert!(result.error().is_none());
        assert_eq!(*publisher.published.lock(), vec!["a", "c"]);

        let retrying = store
            .list_outbox(&scope(), OutboxQuery::status(OutboxStatus::Retrying))
            .await
            .unwrap();
        assert_eq!(retrying.len(), 1);
        assert_eq!(retrying[0].last_error, "smtp timeout");
        assert_eq!(retrying[0].available_at, t0 + Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_publish_timeout_counts_as_failure() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();
        enqueue(&store, "slow", t0).await;
        let dispatcher = OutboxDispatcher::new(store.clone(), Arc::new(StalledPublisher))
            .with_publish_timeout(StdDuration::from_millis(20));

        let result = dispatcher
            .dispatch_batch(DispatchRequest::new(scope(), "worker-1", 10).at(t0))
            .await
            .unwrap();
        assert_eq!(result.retrying, 1);

        let rows = store
            .list_outbox(&scope(), OutboxQuery::default())
            .await
            .unwrap();
        assert!(rows[0].last_error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_topic_filter_limits_claims() {
        let store = Arc::new(InMemoryStore::new());
        let t0 = Utc::now();
        enqueue(&store, "mail", t0).await;
        store
            .enqueue_outbox(
                &scope(),
                NewOutboxMessage::new("webhook.deliver", "hook", serde_json::json!({}))
                    .available_at(t0),
            )
            .await
            .unwrap();
        let dispatcher =
            OutboxDispatcher::new(store.clone(), Arc::new(ScriptedPublisher::default()));

        let result = dispatcher
            .dispatch_batch(
                DispatchRequest::new(scope(), "worker-1", 10)
                    .at(t0)
                    .with_topic("webhook.deliver"),
            )
            .await
            .unwrap();
        assert_eq!((result.claimed, result.published), (1, 1));
        assert_eq!(store.outbox_stats(&scope()).await.unwrap().pending, 1);
    }
}
