//! Credential vault: encrypts OAuth tokens before they reach the store and
//! decrypts them on the way out.

use chrono::{DateTime, Utc};
use esign_server_domain::credentials::{
    IntegrationCredential, IntegrationCredentialRepository, NewIntegrationCredential, SecretValue,
};
use esign_server_domain::{DomainError, Result, Scope};
use esign_shared::config::CredentialsConfig;
use std::sync::Arc;
use tracing::{debug, warn};

use super::encryption::{EncryptionError, EncryptionKey};

impl From<EncryptionError> for DomainError {
    fn from(err: EncryptionError) -> Self {
        DomainError::infrastructure(format!("credential encryption: {}", err))
    }
}

/// Plaintext tokens handed to the vault or returned by it.
#[derive(Debug)]
pub struct OAuthTokens {
    pub access_token: SecretValue,
    pub refresh_token: Option<SecretValue>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct CredentialVault<S: ?Sized> {
    store: Arc<S>,
    key: EncryptionKey,
}

impl<S> CredentialVault<S>
where
    S: IntegrationCredentialRepository + ?Sized,
{
    pub fn new(store: Arc<S>, key: EncryptionKey) -> Self {
        Self { store, key }
    }

    /// `None` when no key is configured; credential storage is then
    /// unavailable rather than stored in plaintext.
    pub fn from_config(store: Arc<S>, config: &CredentialsConfig) -> Result<Option<Self>> {
        match config.encryption_key_hex.as_deref() {
            Some(hex_key) => Ok(Some(Self::new(store, EncryptionKey::from_hex(hex_key)?))),
            None => {
                warn!("No credential encryption key configured, vault disabled");
                Ok(None)
            }
        }
    }

    pub async fn store(
        &self,
        scope: &Scope,
        provider: &str,
        user_id: &str,
        tokens: &OAuthTokens,
    ) -> Result<IntegrationCredential> {
        if tokens.access_token.is_empty() {
            return Err(DomainError::missing(
                "integration_credential",
                "access_token",
                "required",
            ));
        }
        let binding = binding(scope, provider, user_id);
        let encrypted_access_token = self.key.seal(tokens.access_token.expose(), &binding)?;
        let encrypted_refresh_token = match &tokens.refresh_token {
            Some(refresh) if !refresh.is_empty() => self.key.seal(refresh.expose(), &binding)?,
            _ => String::new(),
        };
        let credential = self
            .store
            .upsert_integration_credential(
                scope,
                NewIntegrationCredential {
                    provider: provider.to_string(),
                    user_id: user_id.to_string(),
                    encrypted_access_token,
                    encrypted_refresh_token,
                    scopes: tokens.scopes.clone(),
                    expires_at: tokens.expires_at,
                },
            )
            .await?;
        debug!(provider = %credential.provider, user_id = %credential.user_id, "Stored integration credential");
        Ok(credential)
    }

    pub async fn load(&self, scope: &Scope, provider: &str, user_id: &str) -> Result<OAuthTokens> {
        let credential = self
            .store
            .get_integration_credential(scope, provider, user_id)
            .await?;
        let binding = binding(scope, &credential.provider, &credential.user_id);
        let access_token =
            SecretValue::new(self.key.open(&credential.encrypted_access_token, &binding)?);
        let refresh_token = match credential.encrypted_refresh_token.trim() {
            "" => None,
            sealed => Some(SecretValue::new(self.key.open(sealed, &binding)?)),
        };
        Ok(OAuthTokens {
            access_token,
            refresh_token,
            scopes: credential.scopes,
            expires_at: credential.expires_at,
        })
    }

    pub async fn revoke(&self, scope: &Scope, provider: &str, user_id: &str) -> Result<()> {
        self.store
            .delete_integration_credential(scope, provider, user_id)
            .await
    }
}

/// Associated data tying a sealed token to its credential row. Matches the
/// store's key normalization: lowercase provider, trimmed ids.
fn binding(scope: &Scope, provider: &str, user_id: &str) -> Vec<u8> {
    format!(
        "{}/{}/{}/{}",
        scope.tenant_id.trim(),
        scope.org_id.trim(),
        provider.trim().to_ascii_lowercase(),
        user_id.trim()
    )
    .into_bytes()
}

impl<S: ?Sized> std::fmt::Debug for CredentialVault<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &self.key)
            .finish()
    }
}
