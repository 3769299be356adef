//! Outbox Repository Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{ClaimRequest, NewOutboxMessage, OutboxMessage, OutboxQuery};
use crate::shared_kernel::{Result, Scope};

/// Counts by status, for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub processing: u64,
    pub retrying: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl OutboxStats {
    /// Rows that still need a publish attempt
    pub fn backlog(&self) -> u64 {
        self.pending + self.processing + self.retrying
    }
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Insert a `pending` row. Call inside the business transaction.
    async fn enqueue_outbox(&self, scope: &Scope, message: NewOutboxMessage)
    -> Result<OutboxMessage>;

    /// Move up to `limit` due `pending`/`retrying` rows to `processing`, in
    /// id order. Concurrent claimers never receive the same row.
    async fn claim_outbox(&self, scope: &Scope, request: ClaimRequest)
    -> Result<Vec<OutboxMessage>>;

    /// Settle a row claimed by `consumer`. A row claimed by someone else
    /// returns `INVALID_TRANSITION`.
    async fn mark_outbox_succeeded(
        &self,
        scope: &Scope,
        id: &str,
        consumer: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage>;

    async fn mark_outbox_failed(
        &self,
        scope: &Scope,
        id: &str,
        consumer: &str,
        reason: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage>;

    /// Ordered by id.
    async fn list_outbox(&self, scope: &Scope, query: OutboxQuery) -> Result<Vec<OutboxMessage>>;

    /// Return `processing` rows locked before `locked_before` to `retrying`.
    async fn release_stale_outbox_claims(
        &self,
        scope: &Scope,
        locked_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    async fn outbox_stats(&self, scope: &Scope) -> Result<OutboxStats>;

    /// Delete `succeeded` rows published before the cutoff. Failed rows are
    /// kept for investigation.
    async fn purge_succeeded_outbox(
        &self,
        scope: &Scope,
        published_before: DateTime<Utc>,
    ) -> Result<usize>;
}
