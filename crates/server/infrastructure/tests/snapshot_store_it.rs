//! Integration tests for SqliteSnapshotStore
//!
//! Drives a signing flow through the full store surface on a file-backed
//! database, then reopens it and checks what was persisted.

use chrono::Utc;
use esign_server_domain::agreements::{
    AgreementArtifactPatch, AgreementArtifactRepository, AgreementRepository, AgreementStatus,
    AgreementTransition, FieldDraft, FieldRepository, FieldType, FieldValueInput,
    FieldValueRepository, NewAgreement, RecipientCompletion, RecipientDraft,
    RecipientRepository,
};
use esign_server_domain::audit::{AuditRepository, NewAuditEvent};
use esign_server_domain::credentials::SecretValue;
use esign_server_domain::documents::{DocumentRepository, NewDocument};
use esign_server_domain::outbox::{NewOutboxMessage, OutboxRepository};
use esign_server_domain::{DomainError, ListOptions, Scope, TxManager, with_tx_hooks};
use esign_server_infrastructure::SqliteSnapshotStore;
use esign_server_infrastructure::credentials::{CredentialVault, EncryptionKey, OAuthTokens};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn scope() -> Scope {
    Scope::new("acme", "legal")
}

fn dsn(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("esign.db").display())
}

#[tokio::test]
async fn test_signing_flow_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();

    let document = store
        .create_document(
            &scope(),
            NewDocument {
                title: "Supplier NDA".to_string(),
                source_object_key: "acme/docs/supplier-nda.pdf".to_string(),
                source_sha256: "e3b0c442".to_string(),
                size_bytes: 9_812,
                page_count: 3,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let agreement = store
        .create_draft(
            &scope(),
            NewAgreement {
                document_id: document.id.clone(),
                title: "Supplier NDA".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let signer = store
        .upsert_recipient_draft(
            &scope(),
            &agreement.id,
            RecipientDraft {
                email: "vendor@example.com".to_string(),
                name: "Vendor".to_string(),
                signing_order: 1,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let field = store
        .upsert_field_draft(
            &scope(),
            &agreement.id,
            FieldDraft {
                id: None,
                recipient_id: Some(signer.id.clone()),
                field_type: FieldType::Text,
                page_number: 3,
                pos_x: 72.0,
                pos_y: 640.0,
                width: 180.0,
                height: 24.0,
                required: true,
            },
        )
        .await
        .unwrap();

    // Send and record the outbox message in one transaction.
    let agreement_id = agreement.id.clone();
    let hook_runs = Arc::new(AtomicUsize::new(0));
    let hook_counter = hook_runs.clone();
    let sent = with_tx_hooks(&store, move |tx, hooks| async move {
        let sent = tx
            .transition(
                &scope(),
                &agreement_id,
                AgreementTransition::to(AgreementStatus::Sent, 1),
            )
            .await?;
        tx.enqueue_outbox(
            &scope(),
            NewOutboxMessage::new(
                "email.send",
                format!("{}:invite", agreement_id),
                serde_json::json!({"agreement_id": agreement_id}),
            ),
        )
        .await?;
        hooks.after_commit(move || async move {
            hook_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(sent)
    })
    .await
    .unwrap();
    assert_eq!(sent.version, 2);
    assert_eq!(hook_runs.load(Ordering::SeqCst), 1);

    store
        .upsert_field_value(
            &scope(),
            FieldValueInput {
                id: None,
                agreement_id: agreement.id.clone(),
                recipient_id: signer.id.clone(),
                field_id: field.id.clone(),
                value_text: Some("Jordan Vendor".to_string()),
                value_bool: None,
                signature_artifact_id: None,
                expected_version: 0,
            },
        )
        .await
        .unwrap();
    store
        .complete_recipient(
            &scope(),
            &agreement.id,
            &signer.id,
            RecipientCompletion::default(),
        )
        .await
        .unwrap();
    store
        .save_agreement_artifacts(
            &scope(),
            AgreementArtifactPatch {
                agreement_id: agreement.id.clone(),
                executed_object_key: "acme/agreements/nda/executed.pdf".to_string(),
                executed_sha256: "aa11".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .append_audit_event(
            &scope(),
            NewAuditEvent {
                agreement_id: agreement.id.clone(),
                event_type: "recipient.completed".to_string(),
                actor_type: "recipient".to_string(),
                actor_id: signer.id.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store.close().await.unwrap();

    let reopened = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
    let loaded = reopened.get_agreement(&scope(), &agreement.id).await.unwrap();
    assert_eq!(loaded.status, AgreementStatus::Sent);
    assert_eq!(loaded.version, 2);

    let recipient = reopened
        .get_recipient(&scope(), &agreement.id, &signer.id)
        .await
        .unwrap();
    assert!(recipient.completed_at.is_some());

    let values = reopened
        .list_field_values(&scope(), &agreement.id, Some(&signer.id))
        .await
        .unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value_text.as_deref(), Some("Jordan Vendor"));

    // Executed artifacts are set once.
    let err = reopened
        .save_agreement_artifacts(
            &scope(),
            AgreementArtifactPatch {
                agreement_id: agreement.id.clone(),
                executed_object_key: "acme/agreements/nda/other.pdf".to_string(),
                executed_sha256: "bb22".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));

    let events = reopened
        .list_audit_events(&scope(), &agreement.id, ListOptions::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(reopened.outbox_stats(&scope()).await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_failed_transaction_leaves_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();

    let result: Result<(), DomainError> = store
        .with_tx(|tx| async move {
            tx.enqueue_outbox(
                &scope(),
                NewOutboxMessage::new("email.send", "orphan", serde_json::json!({})),
            )
            .await?;
            Err(DomainError::infrastructure("publisher unavailable"))
        })
        .await;
    assert!(result.is_err());
    store.close().await.unwrap();

    let reopened = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
    assert_eq!(reopened.outbox_stats(&scope()).await.unwrap().backlog(), 0);
}

#[tokio::test]
async fn test_batch_keeps_applied_writes_when_work_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
    let now = Utc::now();

    let outcome: Result<(), DomainError> = store
        .with_batch(|batch| async move {
            batch
                .enqueue_outbox(
                    &scope(),
                    NewOutboxMessage::new("email.send", "kept", serde_json::json!({}))
                        .available_at(now),
                )
                .await?;
            assert!(batch.is_dirty());
            Err(DomainError::not_found("agreement", "missing"))
        })
        .await;
    assert!(matches!(outcome, Err(DomainError::NotFound { .. })));
    assert!(!store.is_dirty());
    store.close().await.unwrap();

    let reopened = SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap();
    assert_eq!(reopened.outbox_stats(&scope()).await.unwrap().pending, 1);
}

#[tokio::test]
async fn test_credentials_are_stored_encrypted() {
    let dir = tempfile::tempdir().unwrap();
    let key_hex = "7f".repeat(32);
    let store = Arc::new(SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap());
    let vault = CredentialVault::new(store.clone(), EncryptionKey::from_hex(&key_hex).unwrap());

    vault
        .store(
            &scope(),
            "google",
            "user-42",
            &OAuthTokens {
                access_token: SecretValue::from("ya29.a0AfH6SMB"),
                refresh_token: None,
                scopes: vec!["https://www.googleapis.com/auth/drive.readonly".to_string()],
                expires_at: None,
            },
        )
        .await
        .unwrap();
    store.close().await.unwrap();

    let raw = std::fs::read(dir.path().join("esign.db")).unwrap();
    assert!(!String::from_utf8_lossy(&raw).contains("ya29.a0AfH6SMB"));

    let reopened = Arc::new(SqliteSnapshotStore::open(&dsn(&dir), 5_000).await.unwrap());
    let vault = CredentialVault::new(reopened, EncryptionKey::from_hex(&key_hex).unwrap());
    let tokens = vault.load(&scope(), "google", "user-42").await.unwrap();
    assert_eq!(tokens.access_token.expose_str(), Some("ya29.a0AfH6SMB"));
    assert!(tokens.refresh_token.is_none());
}
