use super::*;
use chrono::{Duration, Utc};
use esign_server_domain::agreements::{
    Agreement, AgreementArtifactPatch, AgreementArtifactRepository, AgreementFilter,
    AgreementPatch, AgreementRepository, AgreementStatus, AgreementTransition, FieldDraft,
    FieldRepository, FieldType, FieldValueInput, FieldValueRepository, NewAgreement,
    RecipientCompletion, RecipientDecline, RecipientDraft, RecipientRepository, RecipientRole,
};
use esign_server_domain::audit::{AuditRepository, NewAuditEvent};
use esign_server_domain::documents::{DocumentRepository, NewDocument};
use esign_server_domain::jobs::{
    DeliveryStatus, EmailLogRepository, GoogleImportRunRepository, ImportRunFailure,
    ImportRunInput, ImportRunStatus, JobRunFailure, JobRunInput, JobRunRepository, JobRunStatus,
    NewEmailLog,
};
use esign_server_domain::outbox::{
    ClaimRequest, NewOutboxMessage, OutboxMessage, OutboxQuery, OutboxRepository, OutboxStatus,
};
use esign_server_domain::signing::{NewSigningToken, SigningTokenRepository};
use esign_server_domain::{ListOptions, Scope, with_tx_hooks};
use rstest::rstest;
use std::collections::HashSet;

fn t1() -> Scope {
    Scope::new("tenant-1", "org-1")
}

fn t2() -> Scope {
    Scope::new("tenant-2", "org-1")
}

async fn seed_agreement(store: &InMemoryStore, scope: &Scope) -> Agreement {
    let document = store
        .create_document(
            scope,
            NewDocument {
                title: "NDA".to_string(),
                source_object_key: "documents/nda.pdf".to_string(),
                source_sha256: "9f86d081".to_string(),
                size_bytes: 2048,
                page_count: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    store
        .create_draft(
            scope,
            NewAgreement {
                document_id: document.id,
                title: "Mutual NDA".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

fn signer(email: &str, order: i32) -> RecipientDraft {
    RecipientDraft {
        email: email.to_string(),
        name: "Signer".to_string(),
        signing_order: order,
        ..Default::default()
    }
}

fn signature_field(recipient_id: &str) -> FieldDraft {
    FieldDraft {
        id: None,
        recipient_id: Some(recipient_id.to_string()),
        field_type: FieldType::Signature,
        page_number: 1,
        pos_x: 10.0,
        pos_y: 20.0,
        width: 120.0,
        height: 40.0,
        required: true,
    }
}

#[tokio::test]
async fn test_scope_is_validated_before_lookup() {
    let store = InMemoryStore::new();
    let err = store
        .get_agreement(&Scope::new(" ", "org-1"), "missing")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::ScopeRequired {
            field: "tenant_id".to_string()
        }
    );
}

#[tokio::test]
async fn test_cross_scope_access_is_denied() {
    let store = InMemoryStore::new();
    let agreement = seed_agreement(&store, &t1()).await;

    let err = store.get_agreement(&t2(), &agreement.id).await.unwrap_err();
    assert!(matches!(err, DomainError::ScopeDenied { .. }));

    let page = store
        .list_agreements(&t2(), AgreementFilter::default(), ListOptions::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_create_draft_requires_existing_document_and_draft_status() {
    let store = InMemoryStore::new();
    let err = store
        .create_draft(
            &t1(),
            NewAgreement {
                document_id: "nope".to_string(),
                title: "NDA".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let agreement = seed_agreement(&store, &t1()).await;
    let err = store
        .create_draft(
            &t1(),
            NewAgreement {
                document_id: agreement.document_id.clone(),
                title: "NDA".to_string(),
                status: Some(AgreementStatus::Sent),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));
    assert_eq!(agreement.version, 1);
    assert_eq!(agreement.status, AgreementStatus::Draft);
}

#[tokio::test]
async fn test_draft_writes_rejected_after_send() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();

    let sent = store
        .transition(
            &scope,
            &agreement.id,
            AgreementTransition::to(AgreementStatus::Sent, 1),
        )
        .await
        .unwrap();
    assert_eq!(sent.version, 2);
    assert!(sent.sent_at.is_some());

    let err = store
        .update_draft(
            &scope,
            &agreement.id,
            AgreementPatch {
                title: Some("Changed".to_string()),
                ..Default::default()
            },
            2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AgreementImmutable { .. }));

    let err = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("b@example.com", 2))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AgreementImmutable { .. }));

    let err = store
        .upsert_field_draft(&scope, &agreement.id, signature_field(&recipient.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AgreementImmutable { .. }));
}

#[tokio::test]
async fn test_stale_version_is_rejected() {
    let store = InMemoryStore::new();
    let agreement = seed_agreement(&store, &t1()).await;
    let err = store
        .update_draft(&t1(), &agreement.id, AgreementPatch::default(), 5)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DomainError::VersionConflict {
            entity: "agreement".to_string(),
            id: agreement.id.clone(),
            expected: 5,
            actual: 1,
        }
    );

    let updated = store
        .update_draft(&t1(), &agreement.id, AgreementPatch::default(), 0)
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
}

#[tokio::test]
async fn test_signing_order_unique_per_agreement() {
    let store = InMemoryStore::new();
    let agreement = seed_agreement(&store, &t1()).await;
    store
        .upsert_recipient_draft(&t1(), &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    let err = store
        .upsert_recipient_draft(&t1(), &agreement.id, signer("b@example.com", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));
}

#[tokio::test]
async fn test_delete_recipient_cascades_to_fields() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    store
        .upsert_field_draft(&scope, &agreement.id, signature_field(&recipient.id))
        .await
        .unwrap();

    store
        .delete_recipient_draft(&scope, &agreement.id, &recipient.id)
        .await
        .unwrap();
    assert!(
        store
            .list_fields(&scope, &agreement.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(matches!(
        store
            .get_recipient(&scope, &agreement.id, &recipient.id)
            .await,
        Err(DomainError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_field_value_upsert_keeps_stored_id() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    let field = store
        .upsert_field_draft(
            &scope,
            &agreement.id,
            FieldDraft {
                field_type: FieldType::Text,
                ..signature_field(&recipient.id)
            },
        )
        .await
        .unwrap();

    let input = FieldValueInput {
        agreement_id: agreement.id.clone(),
        recipient_id: recipient.id.clone(),
        field_id: field.id.clone(),
        value_text: Some("Ada".to_string()),
        ..Default::default()
    };
    let err = store
        .upsert_field_value(&scope, input.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignerState { .. }));

    store
        .transition(
            &scope,
            &agreement.id,
            AgreementTransition::to(AgreementStatus::Sent, 1),
        )
        .await
        .unwrap();
    let first = store
        .upsert_field_value(&scope, input.clone())
        .await
        .unwrap();
    let second = store
        .upsert_field_value(
            &scope,
            FieldValueInput {
                id: Some("other-id".to_string()),
                value_text: Some("Ada Lovelace".to_string()),
                expected_version: 1,
                ..input
            },
        )
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.version, 2);
    assert_eq!(second.value_text.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn test_completed_recipient_cannot_complete_again() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    store
        .transition(
            &scope,
            &agreement.id,
            AgreementTransition::to(AgreementStatus::Sent, 1),
        )
        .await
        .unwrap();

    let done = store
        .complete_recipient(
            &scope,
            &agreement.id,
            &recipient.id,
            RecipientCompletion::default(),
        )
        .await
        .unwrap();
    assert!(done.completed_at.is_some());

    let err = store
        .complete_recipient(
            &scope,
            &agreement.id,
            &recipient.id,
            RecipientCompletion::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignerState { .. }));
}

#[tokio::test]
async fn test_agreement_artifacts_are_set_once() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let executed = AgreementArtifactPatch {
        agreement_id: agreement.id.clone(),
        executed_object_key: "executed/a.pdf".to_string(),
        executed_sha256: "aaa".to_string(),
        ..Default::default()
    };
    store
        .save_agreement_artifacts(&scope, executed.clone())
        .await
        .unwrap();
    store
        .save_agreement_artifacts(&scope, executed.clone())
        .await
        .unwrap();

    let err = store
        .save_agreement_artifacts(
            &scope,
            AgreementArtifactPatch {
                executed_sha256: "bbb".to_string(),
                ..executed
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));

    let stored = store
        .get_agreement_artifacts(&scope, &agreement.id)
        .await
        .unwrap();
    assert_eq!(stored.executed_sha256, "aaa");
    assert!(stored.certificate_object_key.is_empty());
}

#[tokio::test]
async fn test_audit_events_are_append_only() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let event = store
        .append_audit_event(
            &scope,
            NewAuditEvent {
                agreement_id: agreement.id.clone(),
                event_type: "agreement.sent".to_string(),
                actor_type: "user".to_string(),
                actor_id: "u1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        store.update_audit_event(&scope, event.clone()).await,
        Err(DomainError::AuditEventsAppendOnly)
    );
    assert_eq!(
        store.delete_audit_event(&scope, &event.id).await,
        Err(DomainError::AuditEventsAppendOnly)
    );
    assert!(matches!(
        store
            .delete_audit_event(&Scope::new("t", ""), &event.id)
            .await,
        Err(DomainError::ScopeRequired { .. })
    ));
    let events = store
        .list_audit_events(&scope, &agreement.id, ListOptions::default())
        .await
        .unwrap();
    assert_eq!(events, vec![event]);
}

#[tokio::test]
async fn test_token_hash_is_unique_and_scoped() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    let input = NewSigningToken {
        agreement_id: agreement.id.clone(),
        recipient_id: recipient.id.clone(),
        token_hash: "deadbeef".to_string(),
        expires_at: Utc::now() + Duration::hours(72),
        created_at: None,
    };
    store
        .create_signing_token(&scope, input.clone())
        .await
        .unwrap();
    assert!(store.create_signing_token(&scope, input).await.is_err());

    assert!(matches!(
        store.get_signing_token_by_hash(&t2(), "deadbeef").await,
        Err(DomainError::ScopeDenied { .. })
    ));
    assert!(matches!(
        store.get_signing_token_by_hash(&scope, "unknown").await,
        Err(DomainError::NotFound { .. })
    ));

    let revoked = store
        .revoke_active_signing_tokens(&scope, &agreement.id, &recipient.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(revoked, 1);
}

#[tokio::test]
async fn test_job_run_dedupe_and_retry_window() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    let input = JobRunInput {
        job_name: "send_invitation".to_string(),
        dedupe_key: "agr-1:rcp-1".to_string(),
        max_attempts: 3,
        attempted_at: Some(t0),
        ..Default::default()
    };
    let start = store.begin_job_run(&scope, input.clone()).await.unwrap();
    assert!(start.should_run);
    assert_eq!(start.run.attempt_count, 1);

    let failed = store
        .mark_job_run_failed(
            &scope,
            &start.run.id,
            JobRunFailure {
                reason: "smtp timeout".to_string(),
                next_retry_at: Some(t0 + Duration::minutes(5)),
                failed_at: t0,
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.status, JobRunStatus::Retrying);

    let early = store
        .begin_job_run(
            &scope,
            JobRunInput {
                attempted_at: Some(t0 + Duration::minutes(1)),
                ..input.clone()
            },
        )
        .await
        .unwrap();
    assert!(!early.should_run);

    let retry = store
        .begin_job_run(
            &scope,
            JobRunInput {
                attempted_at: Some(t0 + Duration::minutes(6)),
                ..input.clone()
            },
        )
        .await
        .unwrap();
    assert!(retry.should_run);
    assert_eq!(retry.run.id, start.run.id);
    assert_eq!(retry.run.attempt_count, 2);

    store
        .mark_job_run_succeeded(&scope, &start.run.id, t0 + Duration::minutes(7))
        .await
        .unwrap();
    let after = store.begin_job_run(&scope, input).await.unwrap();
    assert!(!after.should_run);
    assert_eq!(after.run.status, JobRunStatus::Succeeded);
}

#[tokio::test]
async fn test_outbox_claim_in_id_order_with_limit() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    let mut ids = Vec::new();
    for i in 0..3 {
        let message = store
            .enqueue_outbox(
                &scope,
                NewOutboxMessage::new("email.send", format!("k{}", i), serde_json::json!({}))
                    .available_at(t0),
            )
            .await
            .unwrap();
        ids.push(message.id);
    }

    let claimed = store
        .claim_outbox(
            &scope,
            ClaimRequest {
                consumer: "worker-a".to_string(),
                limit: 2,
                topic: None,
                now: t0 + Duration::seconds(1),
            },
        )
        .await
        .unwrap();
    let claimed_ids: Vec<String> = claimed.iter().map(|m| m.id.clone()).collect();
    assert_eq!(claimed_ids, ids[..2].to_vec());
    assert!(claimed.iter().all(|m| m.status == OutboxStatus::Processing));
    assert!(claimed.iter().all(|m| m.attempt_count == 1));

    let pending = store
        .list_outbox(&scope, OutboxQuery::status(OutboxStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, ids[2]);
}

#[tokio::test]
async fn test_concurrent_claims_are_disjoint() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    for i in 0..10 {
        store
            .enqueue_outbox(
                &scope,
                NewOutboxMessage::new("email.send", format!("k{}", i), serde_json::json!({}))
                    .available_at(t0),
            )
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for worker in ["a", "b", "c"] {
        let store = store.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_outbox(
                    &scope,
                    ClaimRequest {
                        consumer: format!("worker-{}", worker),
                        limit: 4,
                        topic: None,
                        now: t0,
                    },
                )
                .await
                .unwrap()
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for message in handle.await.unwrap() {
            total += 1;
            seen.insert(message.id);
        }
    }
    assert_eq!(total, 10);
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;

    let tx_scope = scope.clone();
    let agreement_id = agreement.id.clone();
    let result: Result<()> = store
        .with_tx(move |tx| async move {
            tx.update_draft(
                &tx_scope,
                &agreement_id,
                AgreementPatch {
                    title: Some("Inside tx".to_string()),
                    ..Default::default()
                },
                1,
            )
            .await?;
            Err(DomainError::infrastructure("boom"))
        })
        .await;
    assert!(result.is_err());

    let stored = store.get_agreement(&scope, &agreement.id).await.unwrap();
    assert_eq!(stored.title, "Mutual NDA");
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_transaction_commits_and_closes_handle() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;

    let tx_scope = scope.clone();
    let agreement_id = agreement.id.clone();
    let handle = store
        .with_tx(move |tx| async move {
            tx.transition(
                &tx_scope,
                &agreement_id,
                AgreementTransition::to(AgreementStatus::Sent, 1),
            )
            .await?;
            Ok(tx)
        })
        .await
        .unwrap();

    let stored = store.get_agreement(&scope, &agreement.id).await.unwrap();
    assert_eq!(stored.status, AgreementStatus::Sent);
    assert!(!handle.is_open());
    assert!(matches!(
        handle.get_agreement(&scope, &agreement.id).await,
        Err(DomainError::Infrastructure { .. })
    ));
}

#[tokio::test]
async fn test_hooks_run_after_commit_and_see_committed_state() {
    let store = InMemoryStore::new();
    let scope = t1();
    let observer = store.clone();
    let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();

    let tx_scope = scope.clone();
    let message = with_tx_hooks(&store, move |tx, hooks| async move {
        let message = tx
            .enqueue_outbox(
                &tx_scope,
                NewOutboxMessage::new("email.send", "k1", serde_json::json!({})),
            )
            .await?;
        let hook_scope = tx_scope.clone();
        hooks.after_commit(move || async move {
            let stats = observer.outbox_stats(&hook_scope).await?;
            let _ = seen_tx.send(stats.pending);
            Ok(())
        });
        Ok(message)
    })
    .await
    .unwrap();

    assert_eq!(message.status, OutboxStatus::Pending);
    assert_eq!(seen_rx.await.unwrap(), 1);
}

async fn send(store: &InMemoryStore, scope: &Scope, agreement: &Agreement) {
    store
        .transition(
            scope,
            &agreement.id,
            AgreementTransition::to(AgreementStatus::Sent, agreement.version),
        )
        .await
        .unwrap();
}

async fn enqueue_due(store: &InMemoryStore, scope: &Scope, key: &str, at: chrono::DateTime<Utc>) {
    store
        .enqueue_outbox(
            scope,
            NewOutboxMessage::new("email.send", key, serde_json::json!({})).available_at(at),
        )
        .await
        .unwrap();
}

async fn claim_one(
    store: &InMemoryStore,
    scope: &Scope,
    consumer: &str,
    now: chrono::DateTime<Utc>,
) -> OutboxMessage {
    let mut claimed = store
        .claim_outbox(
            scope,
            ClaimRequest {
                consumer: consumer.to_string(),
                limit: 1,
                topic: None,
                now,
            },
        )
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    claimed.remove(0)
}

#[tokio::test]
async fn test_signer_with_bound_fields_cannot_become_cc() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    store
        .upsert_field_draft(&scope, &agreement.id, signature_field(&recipient.id))
        .await
        .unwrap();

    let demote = RecipientDraft {
        id: Some(recipient.id.clone()),
        role: RecipientRole::Cc,
        expected_version: 1,
        ..signer("a@example.com", 1)
    };
    let err = store
        .upsert_recipient_draft(&scope, &agreement.id, demote.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));
    let stored = store
        .get_recipient(&scope, &agreement.id, &recipient.id)
        .await
        .unwrap();
    assert_eq!(stored.role, RecipientRole::Signer);
    assert_eq!(stored.version, 1);

    // Without signer-bound fields the role change goes through.
    let fields = store.list_fields(&scope, &agreement.id).await.unwrap();
    store
        .upsert_field_draft(
            &scope,
            &agreement.id,
            FieldDraft {
                id: Some(fields[0].id.clone()),
                field_type: FieldType::Text,
                ..signature_field(&recipient.id)
            },
        )
        .await
        .unwrap();
    let cc = store
        .upsert_recipient_draft(&scope, &agreement.id, demote)
        .await
        .unwrap();
    assert_eq!(cc.role, RecipientRole::Cc);
}

#[rstest]
#[case(RecipientRole::Signer, RecipientRole::Signer, false)]
#[case(RecipientRole::Cc, RecipientRole::Signer, true)]
#[case(RecipientRole::Signer, RecipientRole::Cc, true)]
#[case(RecipientRole::Cc, RecipientRole::Cc, true)]
#[tokio::test]
async fn test_signing_order_is_unique_among_signers(
    #[case] first: RecipientRole,
    #[case] second: RecipientRole,
    #[case] accepted: bool,
) {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    store
        .upsert_recipient_draft(
            &scope,
            &agreement.id,
            RecipientDraft {
                role: first,
                ..signer("a@example.com", 1)
            },
        )
        .await
        .unwrap();

    let result = store
        .upsert_recipient_draft(
            &scope,
            &agreement.id,
            RecipientDraft {
                role: second,
                ..signer("b@example.com", 1)
            },
        )
        .await;
    assert_eq!(result.is_ok(), accepted);
}

#[tokio::test]
async fn test_first_view_is_set_once() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    let t0 = Utc::now();

    let err = store
        .touch_recipient_view(&scope, &agreement.id, &recipient.id, t0)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignerState { .. }));

    send(&store, &scope, &agreement).await;
    let first = store
        .touch_recipient_view(&scope, &agreement.id, &recipient.id, t0)
        .await
        .unwrap();
    assert_eq!(first.first_view_at, Some(t0));
    assert_eq!(first.last_view_at, Some(t0));

    let later = t0 + Duration::minutes(5);
    let second = store
        .touch_recipient_view(&scope, &agreement.id, &recipient.id, later)
        .await
        .unwrap();
    assert_eq!(second.first_view_at, Some(t0));
    assert_eq!(second.last_view_at, Some(later));
    assert_eq!(second.version, first.version + 1);
}

#[tokio::test]
async fn test_decline_is_final() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    send(&store, &scope, &agreement).await;

    let declined = store
        .decline_recipient(
            &scope,
            &agreement.id,
            &recipient.id,
            RecipientDecline {
                reason: "  wrong counterparty ".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(declined.declined_at.is_some());
    assert_eq!(declined.decline_reason, "wrong counterparty");

    let err = store
        .decline_recipient(
            &scope,
            &agreement.id,
            &recipient.id,
            RecipientDecline::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignerState { .. }));
    let err = store
        .complete_recipient(
            &scope,
            &agreement.id,
            &recipient.id,
            RecipientCompletion::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidSignerState { .. }));
}

#[tokio::test]
async fn test_delete_field_removes_its_values() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();
    let text = FieldDraft {
        field_type: FieldType::Text,
        ..signature_field(&recipient.id)
    };
    let kept = store
        .upsert_field_draft(&scope, &agreement.id, text.clone())
        .await
        .unwrap();
    let removed = store
        .upsert_field_draft(&scope, &agreement.id, text)
        .await
        .unwrap();
    send(&store, &scope, &agreement).await;
    for field in [&kept, &removed] {
        store
            .upsert_field_value(
                &scope,
                FieldValueInput {
                    agreement_id: agreement.id.clone(),
                    recipient_id: recipient.id.clone(),
                    field_id: field.id.clone(),
                    value_text: Some("Ada".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    // Values only exist once sent; reopen the draft directly to reach the cascade.
    let mut state = store.snapshot();
    if let Some(stored) = state.agreements.get_mut(&agreement.id) {
        stored.status = AgreementStatus::Draft;
    }
    let store = InMemoryStore::from_state(state);

    store
        .delete_field_draft(&scope, &agreement.id, &removed.id)
        .await
        .unwrap();
    let values = store
        .list_field_values(&scope, &agreement.id, None)
        .await
        .unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].field_id, kept.id);
    assert!(matches!(
        store.get_field(&scope, &agreement.id, &removed.id).await,
        Err(DomainError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_duplicate_import_key_returns_existing_run() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    let input = ImportRunInput {
        user_id: "user-1".to_string(),
        google_file_id: "file-1".to_string(),
        source_version: "v1".to_string(),
        max_attempts: 3,
        requested_at: Some(t0),
        ..Default::default()
    };

    let first = store
        .begin_google_import_run(&scope, input.clone())
        .await
        .unwrap();
    assert!(first.should_start);
    assert_eq!(first.run.dedupe_key, "file-1:v1");

    let joined = store
        .begin_google_import_run(&scope, input.clone())
        .await
        .unwrap();
    assert!(!joined.should_start);
    assert_eq!(joined.run.id, first.run.id);
    assert_eq!(joined.run.attempt_count, 1);

    store
        .mark_google_import_failed(
            &scope,
            &first.run.id,
            ImportRunFailure {
                error_code: "EXPORT_FAILED".to_string(),
                error_message: "drive export timed out".to_string(),
                at: t0,
            },
        )
        .await
        .unwrap();
    let replayed = store
        .begin_google_import_run(&scope, input.clone())
        .await
        .unwrap();
    assert!(replayed.should_start);
    assert_eq!(replayed.run.id, first.run.id);
    assert_eq!(replayed.run.attempt_count, 2);
    assert_eq!(replayed.run.status, ImportRunStatus::Queued);

    let next_version = store
        .begin_google_import_run(
            &scope,
            ImportRunInput {
                source_version: "v2".to_string(),
                ..input
            },
        )
        .await
        .unwrap();
    assert!(next_version.should_start);
    assert_ne!(next_version.run.id, first.run.id);
}

#[tokio::test]
async fn test_create_email_log() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let recipient = store
        .upsert_recipient_draft(&scope, &agreement.id, signer("a@example.com", 1))
        .await
        .unwrap();

    let log = store
        .create_email_log(
            &scope,
            NewEmailLog {
                agreement_id: agreement.id.clone(),
                recipient_id: Some(recipient.id.clone()),
                template_code: " invite ".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(log.status, DeliveryStatus::Pending);
    assert_eq!(log.attempt_count, 0);
    assert_eq!(log.template_code, "invite");

    let err = store
        .create_email_log(
            &scope,
            NewEmailLog {
                agreement_id: agreement.id.clone(),
                recipient_id: Some("missing".to_string()),
                template_code: "invite".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
    let err = store
        .create_email_log(
            &scope,
            NewEmailLog {
                agreement_id: agreement.id.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MissingRequiredFields { .. }));

    let logs = store.list_email_logs(&scope, &agreement.id).await.unwrap();
    assert_eq!(logs, vec![log]);
}

#[tokio::test]
async fn test_stale_claims_are_released_and_fenced() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    enqueue_due(&store, &scope, "k1", t0).await;
    enqueue_due(&store, &scope, "k2", t0).await;

    let stale = claim_one(&store, &scope, "worker-a", t0).await;
    let fresh = claim_one(&store, &scope, "worker-b", t0 + Duration::minutes(10)).await;
    let released = store
        .release_stale_outbox_claims(
            &scope,
            t0 + Duration::minutes(5),
            t0 + Duration::minutes(10),
        )
        .await
        .unwrap();
    assert_eq!(released, 1);

    let retrying = store
        .list_outbox(&scope, OutboxQuery::status(OutboxStatus::Retrying))
        .await
        .unwrap();
    assert_eq!(retrying.len(), 1);
    assert_eq!(retrying[0].id, stale.id);
    let processing = store
        .list_outbox(&scope, OutboxQuery::status(OutboxStatus::Processing))
        .await
        .unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, fresh.id);

    // worker-c takes over the released row; the original claimer may no
    // longer settle it.
    let taken = claim_one(&store, &scope, "worker-c", t0 + Duration::minutes(11)).await;
    assert_eq!(taken.id, stale.id);
    let err = store
        .mark_outbox_succeeded(&scope, &stale.id, "worker-a", t0 + Duration::minutes(12))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));
    let err = store
        .mark_outbox_failed(
            &scope,
            &stale.id,
            "worker-a",
            "late failure",
            None,
            t0 + Duration::minutes(12),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidTransition { .. }));

    let settled = store
        .mark_outbox_succeeded(&scope, &stale.id, "worker-c", t0 + Duration::minutes(12))
        .await
        .unwrap();
    assert_eq!(settled.status, OutboxStatus::Succeeded);
}

#[tokio::test]
async fn test_purge_respects_cutoff() {
    let store = InMemoryStore::new();
    let scope = t1();
    let t0 = Utc::now();
    for key in ["old", "recent", "open"] {
        enqueue_due(&store, &scope, key, t0).await;
    }
    let old = claim_one(&store, &scope, "worker-a", t0).await;
    let recent = claim_one(&store, &scope, "worker-a", t0).await;
    store
        .mark_outbox_succeeded(&scope, &old.id, "worker-a", t0)
        .await
        .unwrap();
    store
        .mark_outbox_succeeded(&scope, &recent.id, "worker-a", t0 + Duration::hours(2))
        .await
        .unwrap();

    let purged = store
        .purge_succeeded_outbox(&scope, t0 + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(
        store
            .purge_succeeded_outbox(&t2(), t0 + Duration::days(1))
            .await
            .unwrap(),
        0
    );

    let stats = store.outbox_stats(&scope).await.unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.pending, 1);
    let remaining: Vec<String> = store
        .list_outbox(&scope, OutboxQuery::default())
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert!(!remaining.contains(&old.id));
    assert!(remaining.contains(&recent.id));
}

#[tokio::test]
async fn test_audit_append_minimizes_network_metadata() {
    let store = InMemoryStore::new();
    let scope = t1();
    let agreement = seed_agreement(&store, &scope).await;
    let mut metadata = serde_json::Map::new();
    metadata.insert("email".to_string(), serde_json::json!("signer@example.com"));
    metadata.insert("signed_at".to_string(), serde_json::json!("2026-02-01T12:00:00Z"));

    let event = store
        .append_audit_event(
            &scope,
            NewAuditEvent {
                agreement_id: agreement.id.clone(),
                event_type: "recipient.signed".to_string(),
                actor_type: "signer".to_string(),
                actor_id: "rcp-1".to_string(),
                ip_address: "192.168.1.57".to_string(),
                user_agent: "x".repeat(300),
                metadata,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(event.ip_address, "192.168.1.0/24");
    assert_eq!(event.user_agent.len(), 128);
    assert!(!event.metadata.contains_key("email"));
    assert_eq!(event.metadata["signed_at"], "2026-02-01T12:00:00Z");
}
