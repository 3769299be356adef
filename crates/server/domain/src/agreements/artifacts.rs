use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared_kernel::{DomainError, Result, Scope, Scoped};

/// Immutable pointer to a captured signature image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureArtifact {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub recipient_id: String,
    pub artifact_type: String,
    pub object_key: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

impl Scoped for SignatureArtifact {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewSignatureArtifact {
    pub id: Option<String>,
    pub agreement_id: String,
    pub recipient_id: String,
    pub artifact_type: String,
    pub object_key: String,
    pub sha256: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Executed PDF and completion certificate of one agreement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgreementArtifact {
    pub agreement_id: String,
    pub scope: Scope,
    #[serde(default)]
    pub executed_object_key: String,
    #[serde(default)]
    pub executed_sha256: String,
    #[serde(default)]
    pub certificate_object_key: String,
    #[serde(default)]
    pub certificate_sha256: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for AgreementArtifact {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Any subset of the artifact pairs; empty strings mean "not provided".
#[derive(Debug, Clone, Default)]
pub struct AgreementArtifactPatch {
    pub agreement_id: String,
    pub executed_object_key: String,
    pub executed_sha256: String,
    pub certificate_object_key: String,
    pub certificate_sha256: String,
}

impl AgreementArtifactPatch {
    fn check_pairs(&self) -> Result<()> {
        check_pair(
            "executed",
            &self.executed_object_key,
            &self.executed_sha256,
        )?;
        check_pair(
            "certificate",
            &self.certificate_object_key,
            &self.certificate_sha256,
        )
    }
}

fn check_pair(name: &str, key: &str, sha: &str) -> Result<()> {
    if key.trim().is_empty() != sha.trim().is_empty() {
        return Err(DomainError::missing(
            "agreement_artifact",
            name,
            "object_key and sha256 must be set together",
        ));
    }
    Ok(())
}

fn merge_value(field: &str, stored: &mut String, incoming: &str) -> Result<bool> {
    let incoming = incoming.trim();
    if incoming.is_empty() || stored == incoming {
        return Ok(false);
    }
    if stored.is_empty() {
        *stored = incoming.to_string();
        return Ok(true);
    }
    Err(DomainError::missing(
        "agreement_artifact",
        field,
        "immutable once set",
    ))
}

impl AgreementArtifact {
    /// Apply `patch` under the once-set rule. On error `self` is unchanged.
    /// Returns whether anything changed.
    pub fn merge(&mut self, patch: &AgreementArtifactPatch, now: DateTime<Utc>) -> Result<bool> {
        patch.check_pairs()?;
        let mut next = self.clone();
        let mut changed = false;
        changed |= merge_value(
            "executed_object_key",
            &mut next.executed_object_key,
            &patch.executed_object_key,
        )?;
        changed |= merge_value(
            "executed_sha256",
            &mut next.executed_sha256,
            &patch.executed_sha256,
        )?;
        changed |= merge_value(
            "certificate_object_key",
            &mut next.certificate_object_key,
            &patch.certificate_object_key,
        )?;
        changed |= merge_value(
            "certificate_sha256",
            &mut next.certificate_sha256,
            &patch.certificate_sha256,
        )?;
        if changed {
            next.updated_at = now;
            *self = next;
        }
        Ok(changed)
    }
}
