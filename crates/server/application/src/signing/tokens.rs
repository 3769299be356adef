//! Signing Token Service
//!
//! Issue, rotate, revoke and validate signing tokens. Every mutation runs in
//! one transaction together with its audit event, so a rotation is never
//! observed with both the old and the new token active.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use esign_server_domain::audit::{AuditRepository, NewAuditEvent};
use esign_server_domain::credentials::SecretValue;
use esign_server_domain::policy::minimize_audit_metadata;
use esign_server_domain::signing::{
    NewSigningToken, SigningToken, SigningTokenRepository, SigningTokenStatus,
};
use esign_server_domain::{DomainError, Result, Scope, TransactionalStore, TxManager};
use esign_shared::config::SigningConfig;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::entropy::{EntropySource, OsEntropy};

const TOKEN_BYTES: usize = 32;
const DEFAULT_TTL_HOURS: i64 = 72;
const SERVICE_ACTOR: &str = "signing-token-service";

pub const EVENT_ISSUED: &str = "signing_token.issued";
pub const EVENT_ROTATED: &str = "signing_token.rotated";
pub const EVENT_REVOKED: &str = "signing_token.revoked";

/// Hex SHA-256 of `token`, or of `token:pepper` when a pepper is set.
pub fn hash_token(token: &str, pepper: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    if let Some(pepper) = pepper.filter(|p| !p.is_empty()) {
        hasher.update(b":");
        hasher.update(pepper.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// A freshly minted token. `token` is the only copy of the raw value.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: SecretValue,
    pub record: SigningToken,
}

pub struct SigningTokenService<S> {
    store: Arc<S>,
    entropy: Arc<dyn EntropySource>,
    ttl: Duration,
    pepper: Option<SecretValue>,
}

impl<S> std::fmt::Debug for SigningTokenService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningTokenService")
            .field("ttl_hours", &self.ttl.num_hours())
            .field("peppered", &self.pepper.is_some())
            .finish()
    }
}

impl<S: TransactionalStore> SigningTokenService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            entropy: Arc::new(OsEntropy),
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
            pepper: None,
        }
    }

    pub fn from_config(store: Arc<S>, config: &SigningConfig) -> Self {
        let service = Self::new(store).with_ttl(Duration::hours(config.token_ttl_hours as i64));
        match config.pepper.as_deref() {
            Some(pepper) => service.with_pepper(pepper),
            None => service,
        }
    }

    /// Non-positive keeps the 72 hour default.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        if ttl > Duration::zero() {
            self.ttl = ttl;
        }
        self
    }

    pub fn with_pepper(mut self, pepper: &str) -> Self {
        self.pepper = (!pepper.is_empty()).then(|| SecretValue::from(pepper));
        self
    }

    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn hash(&self, raw: &str) -> String {
        hash_token(raw, self.pepper.as_ref().and_then(SecretValue::expose_str))
    }

    pub async fn issue(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<IssuedToken> {
        let scope = scope.validate()?;
        let now = Utc::now();
        let (raw, input) = self.mint(agreement_id, recipient_id, now)?;

        let record = self
            .store
            .with_tx(move |tx| async move {
                let record = tx.create_signing_token(&scope, input).await?;
                tx.append_audit_event(&scope, audit_event(EVENT_ISSUED, &record, now))
                    .await?;
                Ok(record)
            })
            .await?;

        info!(
            token_id = %record.id,
            agreement_id = %record.agreement_id,
            recipient_id = %record.recipient_id,
            hash_prefix = %hash_prefix(&record.token_hash),
            "Signing token issued"
        );
        Ok(IssuedToken { token: raw, record })
    }

    /// Revoke every active token of the pair and issue a new one, atomically.
    pub async fn rotate(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<IssuedToken> {
        let scope = scope.validate()?;
        let now = Utc::now();
        let (raw, input) = self.mint(agreement_id, recipient_id, now)?;

        let (record, revoked) = self
            .store
            .with_tx(move |tx| async move {
                let revoked = tx
                    .revoke_active_signing_tokens(
                        &scope,
                        &input.agreement_id,
                        &input.recipient_id,
                        now,
                    )
                    .await?;
                let record = tx.create_signing_token(&scope, input).await?;
                tx.append_audit_event(&scope, audit_event(EVENT_ROTATED, &record, now))
                    .await?;
                Ok((record, revoked))
            })
            .await?;

        info!(
            token_id = %record.id,
            agreement_id = %record.agreement_id,
            recipient_id = %record.recipient_id,
            revoked,
            "Signing token rotated"
        );
        Ok(IssuedToken { token: raw, record })
    }

    /// Returns how many active tokens were revoked.
    pub async fn revoke(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<usize> {
        let scope = scope.validate()?;
        let now = Utc::now();
        let agreement_id = agreement_id.to_string();
        let recipient_id = recipient_id.to_string();

        let revoked = self
            .store
            .with_tx(move |tx| async move {
                let revoked = tx
                    .revoke_active_signing_tokens(&scope, &agreement_id, &recipient_id, now)
                    .await?;
                if revoked > 0 {
                    let event = NewAuditEvent {
                        agreement_id: agreement_id.clone(),
                        event_type: EVENT_REVOKED.to_string(),
                        actor_type: "system".to_string(),
                        actor_id: SERVICE_ACTOR.to_string(),
                        metadata: system_metadata(),
                        created_at: Some(now),
                        ..Default::default()
                    };
                    tx.append_audit_event(&scope, event).await?;
                }
                Ok(revoked)
            })
            .await?;

        debug!(revoked, "Signing tokens revoked");
        Ok(revoked)
    }

    pub async fn validate(&self, scope: &Scope, raw: &str) -> Result<SigningToken> {
        self.validate_at(scope, raw, Utc::now()).await
    }

    /// Unknown tokens are `TOKEN_INVALID`; another scope's token stays
    /// `SCOPE_DENIED`.
    pub async fn validate_at(
        &self,
        scope: &Scope,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<SigningToken> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DomainError::TokenInvalid);
        }
        let token = self
            .store
            .get_signing_token_by_hash(scope, &self.hash(raw))
            .await
            .map_err(|err| match err {
                DomainError::NotFound { .. } => DomainError::TokenInvalid,
                other => other,
            })?;

        if token.status == SigningTokenStatus::Revoked || token.revoked_at.is_some() {
            return Err(DomainError::TokenRevoked { token_id: token.id });
        }
        if token.status == SigningTokenStatus::Expired || now > token.expires_at {
            return Err(DomainError::TokenExpired { token_id: token.id });
        }
        if token.status != SigningTokenStatus::Active {
            return Err(DomainError::TokenInvalid);
        }
        Ok(token)
    }

    fn mint(
        &self,
        agreement_id: &str,
        recipient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(SecretValue, NewSigningToken)> {
        let mut bytes = Zeroizing::new([0u8; TOKEN_BYTES]);
        self.entropy.fill(&mut bytes[..])?;
        let raw = SecretValue::new(URL_SAFE_NO_PAD.encode(&bytes[..]));
        let token_hash = self.hash(raw.expose_str().unwrap_or_default());
        Ok((
            raw,
            NewSigningToken {
                agreement_id: agreement_id.to_string(),
                recipient_id: recipient_id.to_string(),
                token_hash,
                expires_at: now + self.ttl,
                created_at: Some(now),
            },
        ))
    }
}

fn system_metadata() -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("actor_type".to_string(), Value::from("system"));
    meta.insert("actor_id".to_string(), Value::from(SERVICE_ACTOR));
    minimize_audit_metadata(&meta)
}

fn audit_event(event_type: &str, token: &SigningToken, now: DateTime<Utc>) -> NewAuditEvent {
    NewAuditEvent {
        agreement_id: token.agreement_id.clone(),
        event_type: event_type.to_string(),
        actor_type: "system".to_string(),
        actor_id: SERVICE_ACTOR.to_string(),
        metadata: system_metadata(),
        created_at: Some(now),
        ..Default::default()
    }
}

fn hash_prefix(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::entropy::EntropyError;
    use esign_server_domain::ListOptions;
    use esign_server_domain::agreements::{
        AgreementRepository, NewAgreement, RecipientDraft, RecipientRepository,
    };
    use esign_server_domain::documents::{DocumentRepository, NewDocument};
    use esign_server_infrastructure::InMemoryStore;

    /// Repeats one byte, so tokens are predictable.
    struct FixedEntropy(u8);

    impl EntropySource for FixedEntropy {
        fn fill(&self, buf: &mut [u8]) -> std::result::Result<(), EntropyError> {
            buf.fill(self.0);
            Ok(())
        }
    }

    struct BrokenEntropy;

    impl EntropySource for BrokenEntropy {
        fn fill(&self, _buf: &mut [u8]) -> std::result::Result<(), EntropyError> {
            Err(EntropyError("device unavailable".to_string()))
        }
    }

    fn scope() -> Scope {
        Scope::new("tenant-1", "org-1")
    }

    async fn seed(store: &InMemoryStore) -> (String, String) {
        let document = store
            .create_document(
                &scope(),
                NewDocument {
                    title: "Offer letter".to_string(),
                    source_object_key: "tenant-1/docs/offer.pdf".to_string(),
                    source_sha256: "ab12".to_string(),
                    size_bytes: 1024,
                    page_count: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let agreement = store
            .create_draft(
                &scope(),
                NewAgreement {
                    document_id: document.id,
                    title: "Offer".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let recipient = store
            .upsert_recipient_draft(
                &scope(),
                &agreement.id,
                RecipientDraft {
                    email: "signer@example.com".to_string(),
                    name: "Signer".to_string(),
                    signing_order: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        (agreement.id, recipient.id)
    }

    #[test]
    fn test_hash_token_with_and_without_pepper() {
        let plain = hash_token("abc", None);
        assert_eq!(
            plain,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_token("abc", Some("")), plain);
        assert_eq!(hash_token("abc", Some("pepper")), hash_token("abc:pepper", None));
        assert_ne!(hash_token("abc", Some("pepper")), plain);
    }

    #[tokio::test]
    async fn test_issue_persists_only_the_hash() {
        let store = Arc::new(InMemoryStore::new());
        let (agreement_id, recipient_id) = seed(&store).await;
        let service = SigningTokenService::new(store.clone())
            .with_entropy(Arc::new(FixedEntropy(7)))
            .with_pepper("s3cret");

        let issued = service
            .issue(&scope(), &agreement_id, &recipient_id)
            .await
            .unwrap();
        let raw = issued.token.expose_str().unwrap().to_string();

        assert_eq!(raw.len(), 43);
        assert!(!raw.contains('=') && !raw.contains('+') && !raw.contains('/'));
        assert_eq!(issued.record.token_hash, hash_token(&raw, Some("s3cret")));
        assert_eq!(
            issued.record.expires_at - issued.record.created_at,
            Duration::hours(72)
        );
        assert!(!format!("{:?}", issued).contains(&raw));

        let persisted = serde_json::to_string(&store.snapshot()).unwrap();
        assert!(!persisted.contains(&raw));

        let events = store
            .list_audit_events(&scope(), &agreement_id, ListOptions::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EVENT_ISSUED);
        assert_eq!(events[0].actor_type, "system");
        assert!(events[0].metadata.keys().all(|k| k == "actor_type" || k == "actor_id"));
    }

    #[tokio::test]
    async fn test_issue_for_unknown_recipient_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let (agreement_id, _) = seed(&store).await;
        let service = SigningTokenService::new(store.clone());

        let err = service
            .issue(&scope(), &agreement_id, "missing-recipient")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(
            store
                .list_audit_events(&scope(), &agreement_id, ListOptions::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_entropy_failure_is_infrastructure_error() {
        let store = Arc::new(InMemoryStore::new());
        let (agreement_id, recipient_id) = seed(&store).await;
        let service =
            SigningTokenService::new(store).with_entropy(Arc::new(BrokenEntropy));

        assert!(matches!(
            service.issue(&scope(), &agreement_id, &recipient_id).await,
            Err(DomainError::Infrastructure { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_unknown_and_expired() {
        let store = Arc::new(InMemoryStore::new());
        let (agreement_id, recipient_id) = seed(&store).await;
        let service = SigningTokenService::new(store).with_ttl(Duration::hours(1));

        assert_eq!(
            service.validate(&scope(), "  ").await,
            Err(DomainError::TokenInvalid)
        );
        assert_eq!(
            service.validate(&scope(), "not-a-token").await,
            Err(DomainError::TokenInvalid)
        );

        let issued = service
            .issue(&scope(), &agreement_id, &recipient_id)
            .await
            .unwrap();
        let raw = issued.token.expose_str().unwrap();
        let later = issued.record.expires_at + Duration::seconds(1);
        assert!(matches!(
            service.validate_at(&scope(), raw, later).await,
            Err(DomainError::TokenExpired { .. })
        ));
        assert!(
            service
                .validate_at(&scope(), raw, issued.record.expires_at)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_revoke_marks_tokens_and_audits_once() {
        let store = Arc::new(InMemoryStore::new());
        let (agreement_id, recipient_id) = seed(&store).await;
        let service = SigningTokenService::new(store.clone());
        let issued = service
            .issue(&scope(), &agreement_id, &recipient_id)
            .await
            .unwrap();

        assert_eq!(
            service
                .revoke(&scope(), &agreement_id, &recipient_id)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            service
                .revoke(&scope(), &agreement_id, &recipient_id)
                .await
                .unwrap(),
            0
        );
        assert!(matches!(
            service
                .validate(&scope(), issued.token.expose_str().unwrap())
                .await,
            Err(DomainError::TokenRevoked { .. })
        ));

        let revocations = store
            .list_audit_events(&scope(), &agreement_id, ListOptions::default())
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == EVENT_REVOKED)
            .count();
        assert_eq!(revocations, 1);
    }
}
