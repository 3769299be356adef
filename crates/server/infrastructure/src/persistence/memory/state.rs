//! Serializable store state.
//!
//! Every entity lives in a map keyed by id; secondary uniqueness keys are
//! kept in explicit index maps so they survive a snapshot round trip.

use esign_server_domain::agreements::{
    Agreement, AgreementArtifact, Field, FieldValue, Recipient, SignatureArtifact,
};
use esign_server_domain::audit::AuditEvent;
use esign_server_domain::credentials::IntegrationCredential;
use esign_server_domain::documents::Document;
use esign_server_domain::jobs::{EmailLog, GoogleImportRun, JobRun};
use esign_server_domain::outbox::OutboxMessage;
use esign_server_domain::signing::SigningToken;
use esign_server_domain::{DomainError, Result, Scope, Scoped};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    pub documents: BTreeMap<String, Document>,
    pub agreements: BTreeMap<String, Agreement>,
    pub recipients: BTreeMap<String, Recipient>,
    pub fields: BTreeMap<String, Field>,
    pub field_values: BTreeMap<String, FieldValue>,
    pub signature_artifacts: BTreeMap<String, SignatureArtifact>,
    /// Keyed by agreement id.
    pub agreement_artifacts: BTreeMap<String, AgreementArtifact>,
    pub audit_events: BTreeMap<String, AuditEvent>,
    pub signing_tokens: BTreeMap<String, SigningToken>,
    pub job_runs: BTreeMap<String, JobRun>,
    pub google_import_runs: BTreeMap<String, GoogleImportRun>,
    pub email_logs: BTreeMap<String, EmailLog>,
    pub integration_credentials: BTreeMap<String, IntegrationCredential>,
    pub outbox_messages: BTreeMap<String, OutboxMessage>,

    /// token hash -> signing token id. Hashes are unique across scopes.
    pub token_hash_index: BTreeMap<String, String>,
    /// scope + job name + dedupe key -> job run id
    pub job_dedupe_index: BTreeMap<String, String>,
    /// scope + user + dedupe key -> import run id
    pub import_dedupe_index: BTreeMap<String, String>,
    /// scope + provider + user -> credential id
    pub credential_index: BTreeMap<String, String>,
}

impl StoreState {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DomainError::infrastructure(format!("decode store snapshot: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::infrastructure(format!("encode store snapshot: {}", e)))
    }
}

const KEY_SEPARATOR: char = '\u{1f}';

/// Composite key for the scoped secondary indexes.
pub(crate) fn index_key(scope: &Scope, parts: &[&str]) -> String {
    let mut key = format!("{}{}{}", scope.tenant_id, KEY_SEPARATOR, scope.org_id);
    for part in parts {
        key.push(KEY_SEPARATOR);
        key.push_str(part);
    }
    key
}

/// Fetch a record by id: `NOT_FOUND` when absent, `SCOPE_DENIED` when it
/// belongs to another scope.
pub(crate) fn lookup<'a, T: Scoped>(
    map: &'a BTreeMap<String, T>,
    scope: &Scope,
    entity: &str,
    id: &str,
) -> Result<&'a T> {
    let id = id.trim();
    if id.is_empty() {
        return Err(DomainError::missing(entity, "id", "required"));
    }
    let record = map
        .get(id)
        .ok_or_else(|| DomainError::not_found(entity, id))?;
    scope.ensure_owns(record.scope(), entity, id)?;
    Ok(record)
}

/// Reject a caller-supplied id that is already taken.
pub(crate) fn ensure_free<T: Scoped>(
    map: &BTreeMap<String, T>,
    scope: &Scope,
    entity: &str,
    id: &str,
) -> Result<()> {
    match map.get(id) {
        None => Ok(()),
        Some(existing) => {
            scope.ensure_owns(existing.scope(), entity, id)?;
            Err(DomainError::missing(entity, "id", "already exists"))
        }
    }
}

/// Child lookups must name the parent they belong to.
pub(crate) fn ensure_parent(entity: &str, id: &str, actual: &str, expected: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(DomainError::not_found(entity, id))
    }
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
