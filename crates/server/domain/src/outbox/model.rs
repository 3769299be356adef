//! Outbox Message Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::jobs::{FailureSettlement, settle_failure};
use crate::shared_kernel::{DomainError, Result, Scope, Scoped};

/// Retry delay applied when the caller does not supply one.
pub const DEFAULT_RETRY_DELAY_SECS: i64 = 30;

/// Status of an outbox message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Enqueued, never claimed
    #[default]
    Pending,
    /// Claimed by a consumer, awaiting settlement
    Processing,
    /// Publish failed, claimable again once `available_at` passes
    Retrying,
    Succeeded,
    /// Attempt budget spent; never retried automatically
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Processing => "processing",
            OutboxStatus::Retrying => "retrying",
            OutboxStatus::Succeeded => "succeeded",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, OutboxStatus::Pending | OutboxStatus::Retrying)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message to be inserted inside a business transaction
#[derive(Debug, Clone, Default)]
pub struct NewOutboxMessage {
    pub id: Option<String>,
    pub topic: String,
    /// Idempotency fingerprint downstream publishers deduplicate on.
    pub message_key: String,
    pub payload: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub correlation_id: String,
    /// Non-positive selects the default budget of 3.
    pub max_attempts: i32,
    pub available_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewOutboxMessage {
    pub fn new(topic: impl Into<String>, message_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            message_key: message_key.into(),
            payload,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn available_at(mut self, at: DateTime<Utc>) -> Self {
        self.available_at = Some(at);
        self
    }
}

/// A stored outbox message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: String,
    pub scope: Scope,
    pub topic: String,
    pub message_key: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub correlation_id: String,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    #[serde(default)]
    pub last_error: String,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub locked_by: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for OutboxMessage {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl OutboxMessage {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.available_at <= now
    }

    pub fn claim(&mut self, consumer: &str, now: DateTime<Utc>) {
        self.status = OutboxStatus::Processing;
        self.locked_by = consumer.to_string();
        self.locked_at = Some(now);
        self.attempt_count += 1;
        self.updated_at = now;
    }

    /// Settling `succeeded` twice is a no-op; any other non-processing row,
    /// or a row now claimed by another consumer, is rejected.
    pub fn mark_succeeded(&mut self, consumer: &str, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            OutboxStatus::Succeeded => Ok(()),
            OutboxStatus::Processing => {
                self.ensure_locked_by(consumer, OutboxStatus::Succeeded)?;
                self.status = OutboxStatus::Succeeded;
                self.published_at = Some(now);
                self.last_error.clear();
                self.locked_at = None;
                self.updated_at = now;
                Ok(())
            }
            _ => Err(self.invalid_transition(OutboxStatus::Succeeded)),
        }
    }

    /// Retry at `next_attempt_at` (default `now + 30s`) or fail terminally
    /// once the attempt budget is spent.
    pub fn mark_failed(
        &mut self,
        consumer: &str,
        reason: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status != OutboxStatus::Processing {
            return Err(self.invalid_transition(OutboxStatus::Failed));
        }
        self.ensure_locked_by(consumer, OutboxStatus::Failed)?;
        let next = next_attempt_at
            .unwrap_or_else(|| now + chrono::Duration::seconds(DEFAULT_RETRY_DELAY_SECS));
        self.last_error = reason.to_string();
        self.locked_at = None;
        self.updated_at = now;
        match settle_failure(self.attempt_count, self.max_attempts, Some(next)) {
            FailureSettlement::Terminal => self.status = OutboxStatus::Failed,
            FailureSettlement::Retry { at } => {
                self.status = OutboxStatus::Retrying;
                self.available_at = at;
            }
        }
        Ok(())
    }

    /// Return an abandoned claim to the retry queue.
    pub fn release(&mut self, now: DateTime<Utc>) {
        self.status = OutboxStatus::Retrying;
        self.available_at = now;
        self.locked_at = None;
        self.last_error = format!("claim by {} expired", self.locked_by);
        self.updated_at = now;
    }

    /// A claim released as stale may have been handed to another worker.
    fn ensure_locked_by(&self, consumer: &str, to: OutboxStatus) -> Result<()> {
        if self.locked_by == consumer.trim() {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                entity: "outbox_message".to_string(),
                id: self.id.clone(),
                from: format!("{} by {}", self.status, self.locked_by),
                to: to.to_string(),
            })
        }
    }

    fn invalid_transition(&self, to: OutboxStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "outbox_message".to_string(),
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// Claim up to `limit` due rows for `consumer`.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub consumer: String,
    pub limit: usize,
    pub topic: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct OutboxQuery {
    pub topic: Option<String>,
    pub status: Option<OutboxStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl OutboxQuery {
    pub fn status(status: OutboxStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}
