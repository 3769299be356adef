use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared_kernel::{DomainError, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientRole {
    #[default]
    Signer,
    Cc,
}

impl RecipientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientRole::Signer => "signer",
            RecipientRole::Cc => "cc",
        }
    }
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signer or CC participant of one agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub email: String,
    pub name: String,
    pub role: RecipientRole,
    pub signing_order: i32,
    pub first_view_at: Option<DateTime<Utc>>,
    pub last_view_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decline_reason: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some() || self.declined_at.is_some()
    }

    /// Completing or declining twice, or declining after completing, is rejected.
    pub fn ensure_can_finish(&self) -> Result<()> {
        if self.completed_at.is_some() {
            return Err(DomainError::InvalidSignerState {
                message: format!("recipient {} already completed", self.id),
            });
        }
        if self.declined_at.is_some() {
            return Err(DomainError::InvalidSignerState {
                message: format!("recipient {} already declined", self.id),
            });
        }
        Ok(())
    }
}

impl Scoped for Recipient {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Create-or-merge input for a draft recipient. When `id` names an existing
/// recipient the draft fields are merged into it.
#[derive(Debug, Clone, Default)]
pub struct RecipientDraft {
    pub id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: RecipientRole,
    pub signing_order: i32,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RecipientCompletion {
    pub expected_version: i64,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RecipientDecline {
    pub reason: String,
    pub expected_version: i64,
    pub at: Option<DateTime<Utc>>,
}

/// Lowercased, trimmed email with a minimal shape check.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    if email.is_empty() {
        return Err(DomainError::missing("recipient", "email", "required"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::missing(
            "recipient",
            "email",
            "must be a valid address",
        )),
    }
}
