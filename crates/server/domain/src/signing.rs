//! Hash-only signing token records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared_kernel::{Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningTokenStatus {
    #[default]
    Active,
    Revoked,
    Expired,
}

impl SigningTokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningTokenStatus::Active => "active",
            SigningTokenStatus::Revoked => "revoked",
            SigningTokenStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for SigningTokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted token. Only the hash of the raw token is ever stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningToken {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub recipient_id: String,
    pub token_hash: String,
    pub status: SigningTokenStatus,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Scoped for SigningToken {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[derive(Debug, Clone)]
pub struct NewSigningToken {
    pub agreement_id: String,
    pub recipient_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SigningTokenRepository: Send + Sync {
    /// Requires the agreement and recipient to exist; `token_hash` is unique.
    async fn create_signing_token(
        &self,
        scope: &Scope,
        input: NewSigningToken,
    ) -> Result<SigningToken>;

    /// `NOT_FOUND` for unknown hashes, `SCOPE_DENIED` for another scope's token.
    async fn get_signing_token_by_hash(
        &self,
        scope: &Scope,
        token_hash: &str,
    ) -> Result<SigningToken>;

    /// Marks every active token of the pair revoked; returns how many changed.
    async fn revoke_active_signing_tokens(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    async fn list_signing_tokens(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<SigningToken>>;
}
