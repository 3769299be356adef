//! Agreements: the lifecycle root and its draft-time children.
//!
//! An agreement is created in `draft`. While in draft, recipients and fields
//! may be added, merged and deleted; once it leaves draft those writes are
//! rejected with `AGREEMENT_IMMUTABLE` and only signer-driven writes (view,
//! complete, decline, field values) are accepted.

pub mod artifacts;
pub mod fields;
pub mod participants;
pub mod repository;

pub use artifacts::*;
pub use fields::*;
pub use participants::*;
pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::shared_kernel::{DomainError, Paginated, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementStatus {
    #[default]
    Draft,
    Sent,
    InProgress,
    Completed,
    Voided,
    Declined,
    Expired,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Draft => "draft",
            AgreementStatus::Sent => "sent",
            AgreementStatus::InProgress => "in_progress",
            AgreementStatus::Completed => "completed",
            AgreementStatus::Voided => "voided",
            AgreementStatus::Declined => "declined",
            AgreementStatus::Expired => "expired",
        }
    }

    /// Sent or in progress: the states in which signers may act.
    pub fn accepts_signer_actions(&self) -> bool {
        matches!(self, AgreementStatus::Sent | AgreementStatus::InProgress)
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgreementStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(AgreementStatus::Draft),
            "sent" => Ok(AgreementStatus::Sent),
            "in_progress" => Ok(AgreementStatus::InProgress),
            "completed" => Ok(AgreementStatus::Completed),
            "voided" => Ok(AgreementStatus::Voided),
            "declined" => Ok(AgreementStatus::Declined),
            "expired" => Ok(AgreementStatus::Expired),
            other => Err(DomainError::missing(
                "agreement",
                "status",
                format!("unknown status {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: String,
    pub scope: Scope,
    pub document_id: String,
    pub status: AgreementStatus,
    pub title: String,
    pub message: String,
    pub version: i64,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    /// `AGREEMENT_IMMUTABLE` unless the agreement is still a draft.
    pub fn ensure_draft(&self) -> Result<()> {
        if self.status == AgreementStatus::Draft {
            Ok(())
        } else {
            Err(DomainError::AgreementImmutable {
                agreement_id: self.id.clone(),
                status: self.status.to_string(),
            })
        }
    }

    pub fn ensure_signer_actions(&self) -> Result<()> {
        if self.status.accepts_signer_actions() {
            Ok(())
        } else {
            Err(DomainError::InvalidSignerState {
                message: format!(
                    "agreement {} is {}, signer actions require sent or in_progress",
                    self.id, self.status
                ),
            })
        }
    }

    /// Move to `to`, stamping the matching lifecycle timestamp.
    pub fn apply_transition(&mut self, to: AgreementStatus, at: DateTime<Utc>) {
        self.status = to;
        match to {
            AgreementStatus::Sent => self.sent_at = Some(at),
            AgreementStatus::Completed => self.completed_at = Some(at),
            AgreementStatus::Voided => self.voided_at = Some(at),
            AgreementStatus::Declined => self.declined_at = Some(at),
            AgreementStatus::Expired => self.expired_at = Some(at),
            AgreementStatus::Draft | AgreementStatus::InProgress => {}
        }
        self.version += 1;
        self.updated_at = at;
    }
}

impl Scoped for Agreement {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Paginated for Agreement {
    fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

/// Input for `create_draft`. A status other than `draft` is rejected.
#[derive(Debug, Clone, Default)]
pub struct NewAgreement {
    pub id: Option<String>,
    pub document_id: String,
    pub title: String,
    pub message: String,
    pub status: Option<AgreementStatus>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Draft-only fields; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct AgreementPatch {
    pub title: Option<String>,
    pub message: Option<String>,
    pub document_id: Option<String>,
}

impl AgreementPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.message.is_none() && self.document_id.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct AgreementTransition {
    pub to: AgreementStatus,
    pub expected_version: i64,
    pub at: Option<DateTime<Utc>>,
}

impl AgreementTransition {
    pub fn to(to: AgreementStatus, expected_version: i64) -> Self {
        Self {
            to,
            expected_version,
            at: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgreementFilter {
    pub status: Option<AgreementStatus>,
}

/// `VERSION_CONFLICT` when `expected > 0` and differs from `actual`.
pub fn check_version(entity: &str, id: &str, expected: i64, actual: i64) -> Result<()> {
    if expected > 0 && expected != actual {
        return Err(DomainError::VersionConflict {
            entity: entity.to_string(),
            id: id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
