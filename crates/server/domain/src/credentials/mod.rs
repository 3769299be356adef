//! Integration credentials
//!
//! OAuth tokens for third-party integrations (Google Drive import) are
//! stored encrypted, one row per `(scope, provider, user_id)`. The store
//! never sees plaintext; encryption happens in the credential vault before
//! the upsert.

mod secret;

pub use secret::SecretValue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared_kernel::{Result, Scope, Scoped};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationCredential {
    pub id: String,
    pub scope: Scope,
    pub provider: String,
    pub user_id: String,
    pub encrypted_access_token: String,
    #[serde(default)]
    pub encrypted_refresh_token: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for IntegrationCredential {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl IntegrationCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewIntegrationCredential {
    pub provider: String,
    pub user_id: String,
    pub encrypted_access_token: String,
    pub encrypted_refresh_token: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait IntegrationCredentialRepository: Send + Sync {
    /// Insert or replace the credential for `(scope, provider, user_id)`.
    async fn upsert_integration_credential(
        &self,
        scope: &Scope,
        input: NewIntegrationCredential,
    ) -> Result<IntegrationCredential>;

    async fn get_integration_credential(
        &self,
        scope: &Scope,
        provider: &str,
        user_id: &str,
    ) -> Result<IntegrationCredential>;

    async fn delete_integration_credential(
        &self,
        scope: &Scope,
        provider: &str,
        user_id: &str,
    ) -> Result<()>;
}
