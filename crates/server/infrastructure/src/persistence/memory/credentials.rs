use chrono::{DateTime, Utc};
use esign_server_domain::credentials::{IntegrationCredential, NewIntegrationCredential};
use esign_server_domain::{DomainError, Result, Scope, mint_id, require_text};

use super::state::{StoreState, index_key, lookup};

fn credential_key(scope: &Scope, provider: &str, user_id: &str) -> Result<(String, String, String)> {
    let provider = require_text("integration_credential", "provider", provider)?.to_ascii_lowercase();
    let user_id = require_text("integration_credential", "user_id", user_id)?;
    let key = index_key(scope, &[&provider, &user_id]);
    Ok((key, provider, user_id))
}

impl StoreState {
    pub(crate) fn upsert_integration_credential(
        &mut self,
        scope: &Scope,
        input: NewIntegrationCredential,
        now: DateTime<Utc>,
    ) -> Result<IntegrationCredential> {
        let (key, provider, user_id) = credential_key(scope, &input.provider, &input.user_id)?;
        let encrypted_access_token = require_text(
            "integration_credential",
            "encrypted_access_token",
            &input.encrypted_access_token,
        )?;
        let scopes: Vec<String> = input
            .scopes
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let credential = match self.credential_index.get(&key) {
            Some(id) => {
                let existing = lookup(&self.integration_credentials, scope, "integration_credential", id)?;
                IntegrationCredential {
                    encrypted_access_token,
                    encrypted_refresh_token: input.encrypted_refresh_token.trim().to_string(),
                    scopes,
                    expires_at: input.expires_at,
                    updated_at: now,
                    ..existing.clone()
                }
            }
            None => IntegrationCredential {
                id: mint_id(),
                scope: scope.clone(),
                provider,
                user_id,
                encrypted_access_token,
                encrypted_refresh_token: input.encrypted_refresh_token.trim().to_string(),
                scopes,
                expires_at: input.expires_at,
                created_at: now,
                updated_at: now,
            },
        };
        self.credential_index.insert(key, credential.id.clone());
        self.integration_credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(credential)
    }

    pub(crate) fn integration_credential(
        &self,
        scope: &Scope,
        provider: &str,
        user_id: &str,
    ) -> Result<&IntegrationCredential> {
        let (key, provider, user_id) = credential_key(scope, provider, user_id)?;
        let id = self.credential_index.get(&key).ok_or_else(|| {
            DomainError::not_found("integration_credential", format!("{}:{}", provider, user_id))
        })?;
        lookup(&self.integration_credentials, scope, "integration_credential", id)
    }

    pub(crate) fn delete_integration_credential(
        &mut self,
        scope: &Scope,
        provider: &str,
        user_id: &str,
    ) -> Result<()> {
        let id = self.integration_credential(scope, provider, user_id)?.id.clone();
        let (key, _, _) = credential_key(scope, provider, user_id)?;
        self.credential_index.remove(&key);
        self.integration_credentials.remove(&id);
        Ok(())
    }
}
