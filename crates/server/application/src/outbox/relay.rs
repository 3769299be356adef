//! Outbox Relay
//!
//! Background task that runs a dispatch batch for every configured scope on
//! each tick. Post-commit hooks call [`RelayHandle::wake`] so freshly
//! enqueued rows go out without waiting for the next poll.

use chrono::Duration;
use esign_server_domain::outbox::{OutboxPublisher, OutboxRepository};
use esign_server_domain::{Result, Scope, TxHooks};
use esign_shared::config::OutboxConfig;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::{Notify, broadcast};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use super::dispatcher::{DispatchRequest, DispatchResult, OutboxDispatcher};

/// Configuration for the relay loop
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub consumer: String,
    pub batch_size: usize,
    pub retry_delay: Duration,
    pub poll_interval: StdDuration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&OutboxConfig::default())
    }
}

impl From<&OutboxConfig> for RelayConfig {
    fn from(config: &OutboxConfig) -> Self {
        Self {
            consumer: config.consumer.clone(),
            batch_size: config.batch_size,
            retry_delay: Duration::seconds(config.retry_delay_secs as i64),
            poll_interval: StdDuration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

/// Wakes a running relay early. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RelayHandle {
    notify: Arc<Notify>,
}

impl RelayHandle {
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Register a wake-up to fire once the surrounding transaction commits.
    pub fn wake_after_commit(&self, hooks: &TxHooks) {
        let handle = self.clone();
        hooks.after_commit(move || async move {
            handle.wake();
            Ok(())
        });
    }
}

pub struct OutboxRelay<S: ?Sized, P: ?Sized> {
    dispatcher: OutboxDispatcher<S, P>,
    scopes: Vec<Scope>,
    config: RelayConfig,
    handle: RelayHandle,
    shutdown: broadcast::Receiver<()>,
}

impl<S, P> OutboxRelay<S, P>
where
    S: OutboxRepository + ?Sized,
    P: OutboxPublisher + ?Sized,
{
    pub fn new(
        dispatcher: OutboxDispatcher<S, P>,
        scopes: Vec<Scope>,
        config: RelayConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher,
            scopes,
            config,
            handle: RelayHandle::default(),
            shutdown,
        }
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Runs until a shutdown signal arrives or the sender is dropped.
    pub async fn run(&mut self) {
        info!(
            consumer = %self.config.consumer,
            scopes = self.scopes.len(),
            interval = ?self.config.poll_interval,
            "OutboxRelay started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let notify = self.handle.notify.clone();

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("OutboxRelay shutting down");
                    break;
                }
                _ = ticker.tick() => {}
                _ = notify.notified() => {}
            }
            if let Err(e) = self.tick().await.into_result() {
                error!("Outbox relay tick failed: {}", e);
            }
        }
    }

    /// One batch per scope. A failing scope does not stop the others.
    pub async fn tick(&self) -> DispatchResult {
        let mut total = DispatchResult::default();
        for scope in &self.scopes {
            let request = DispatchRequest::new(
                scope.clone(),
                self.config.consumer.clone(),
                self.config.batch_size,
            )
            .with_retry_delay(self.config.retry_delay);
            match self.dispatcher.dispatch_batch(request).await {
                Ok(result) => total.merge(result),
                Err(err) => total.errors.push(err),
            }
        }
        total
    }

    /// A single tick with settlement errors surfaced as `Err`.
    pub async fn dispatch_once(&self) -> Result<DispatchResult> {
        self.tick().await.into_result()
    }
}

impl<S: ?Sized, P: ?Sized> OutboxRelay<S, P> {
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}
