use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::attempts::{FailureSettlement, settle_failure};
use crate::shared_kernel::{DomainError, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Retrying,
    Succeeded,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Succeeded => "succeeded",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Succeeded | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery record of one outbound email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub recipient_id: Option<String>,
    pub template_code: String,
    #[serde(default)]
    pub provider_message_id: String,
    pub status: DeliveryStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub correlation_id: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for EmailLog {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl EmailLog {
    pub fn mark_sent(&mut self, provider_message_id: &str, at: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(DeliveryStatus::Succeeded));
        }
        self.attempt_count += 1;
        self.status = DeliveryStatus::Succeeded;
        self.provider_message_id = provider_message_id.trim().to_string();
        self.last_error.clear();
        self.next_retry_at = None;
        self.sent_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        reason: &str,
        next_retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(DeliveryStatus::Failed));
        }
        self.attempt_count += 1;
        self.last_error = reason.to_string();
        self.updated_at = at;
        match settle_failure(self.attempt_count, self.max_attempts, next_retry_at) {
            FailureSettlement::Terminal => {
                self.status = DeliveryStatus::Failed;
                self.next_retry_at = None;
            }
            FailureSettlement::Retry { at } => {
                self.status = DeliveryStatus::Retrying;
                self.next_retry_at = Some(at);
            }
        }
        Ok(())
    }

    fn invalid_transition(&self, to: DeliveryStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "email_log".to_string(),
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewEmailLog {
    pub id: Option<String>,
    pub agreement_id: String,
    pub recipient_id: Option<String>,
    pub template_code: String,
    pub max_attempts: i32,
    pub correlation_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait EmailLogRepository: Send + Sync {
    async fn create_email_log(&self, scope: &Scope, input: NewEmailLog) -> Result<EmailLog>;

    async fn mark_email_log_sent(
        &self,
        scope: &Scope,
        id: &str,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EmailLog>;

    async fn mark_email_log_failed(
        &self,
        scope: &Scope,
        id: &str,
        reason: &str,
        next_retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<EmailLog>;

    /// Ordered by `created_at`, then id.
    async fn list_email_logs(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<EmailLog>>;
}
