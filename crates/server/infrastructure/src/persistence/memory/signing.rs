use chrono::{DateTime, Utc};
use esign_server_domain::signing::{NewSigningToken, SigningToken, SigningTokenStatus};
use esign_server_domain::{DomainError, Result, Scope, mint_id, require_text, resolve_time};
use tracing::debug;

use super::state::{StoreState, lookup};

impl StoreState {
    pub(crate) fn create_signing_token(
        &mut self,
        scope: &Scope,
        input: NewSigningToken,
        now: DateTime<Utc>,
    ) -> Result<SigningToken> {
        let agreement_id = require_text("signing_token", "agreement_id", &input.agreement_id)?;
        let recipient_id = require_text("signing_token", "recipient_id", &input.recipient_id)?;
        let token_hash = require_text("signing_token", "token_hash", &input.token_hash)?;
        self.recipient(scope, &agreement_id, &recipient_id)?;
        if self.token_hash_index.contains_key(&token_hash) {
            return Err(DomainError::missing(
                "signing_token",
                "token_hash",
                "already exists",
            ));
        }

        let id = mint_id();
        let token = SigningToken {
            id: id.clone(),
            scope: scope.clone(),
            agreement_id,
            recipient_id,
            token_hash: token_hash.clone(),
            status: SigningTokenStatus::Active,
            expires_at: input.expires_at,
            revoked_at: None,
            created_at: resolve_time(input.created_at, now),
        };
        self.token_hash_index.insert(token_hash, id.clone());
        self.signing_tokens.insert(id, token.clone());
        Ok(token)
    }

    pub(crate) fn signing_token_by_hash(
        &self,
        scope: &Scope,
        token_hash: &str,
    ) -> Result<&SigningToken> {
        let token_hash = token_hash.trim();
        let id = self
            .token_hash_index
            .get(token_hash)
            .ok_or_else(|| DomainError::not_found("signing_token", "by hash"))?;
        lookup(&self.signing_tokens, scope, "signing_token", id)
    }

    pub(crate) fn revoke_active_signing_tokens(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let agreement_id = self.agreement(scope, agreement_id)?.id.clone();
        let recipient_id = recipient_id.trim();
        let mut revoked = 0;
        for token in self.signing_tokens.values_mut().filter(|t| {
            t.agreement_id == agreement_id
                && t.recipient_id == recipient_id
                && t.status == SigningTokenStatus::Active
        }) {
            token.status = SigningTokenStatus::Revoked;
            token.revoked_at = Some(at);
            revoked += 1;
        }
        debug!(%agreement_id, %recipient_id, revoked, "Revoked active signing tokens");
        Ok(revoked)
    }

    pub(crate) fn list_signing_tokens(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<Vec<SigningToken>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let recipient_id = recipient_id.trim();
        let mut tokens: Vec<SigningToken> = self
            .signing_tokens
            .values()
            .filter(|t| t.agreement_id == agreement.id && t.recipient_id == recipient_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tokens)
    }
}
