//! Repository facets over any [`StateAccess`](super::StateAccess) type.
//!
//! Every facet method validates the scope first, then reads or writes the
//! state through the access trait. Writes capture their clock before
//! entering the state closure.

/// Implement every store facet for a concrete [`StateAccess`](super::StateAccess) type.
macro_rules! impl_store_facets {
    ($ty:ty) => {
        const _: () = {
            use ::async_trait::async_trait;
            use ::chrono::{DateTime, Utc};
            use ::esign_server_domain::agreements::{
                Agreement, AgreementArtifact, AgreementArtifactPatch, AgreementArtifactRepository,
                AgreementFilter, AgreementPatch, AgreementRepository, AgreementTransition, Field,
                FieldDraft, FieldRepository, FieldValue, FieldValueInput, FieldValueRepository,
                NewAgreement, NewSignatureArtifact, Recipient, RecipientCompletion,
                RecipientDecline, RecipientDraft, RecipientRepository, SignatureArtifact,
                SignatureArtifactRepository,
            };
            use ::esign_server_domain::audit::{AuditEvent, AuditRepository, NewAuditEvent};
            use ::esign_server_domain::credentials::{
                IntegrationCredential, IntegrationCredentialRepository, NewIntegrationCredential,
            };
            use ::esign_server_domain::documents::{Document, DocumentRepository, NewDocument};
            use ::esign_server_domain::jobs::{
                EmailLog, EmailLogRepository, GoogleImportRun, GoogleImportRunRepository,
                ImportRunFailure, ImportRunInput, ImportRunResult, ImportRunStart, JobRun,
                JobRunFailure, JobRunInput, JobRunRepository, JobRunStart, NewEmailLog,
            };
            use ::esign_server_domain::outbox::{
                ClaimRequest, NewOutboxMessage, OutboxMessage, OutboxQuery, OutboxRepository,
                OutboxStats,
            };
            use ::esign_server_domain::signing::{
                NewSigningToken, SigningToken, SigningTokenRepository,
            };
            use ::esign_server_domain::{DomainError, ListOptions, Page, Result, Scope};
            use $crate::persistence::memory::StateAccess;

            #[async_trait]
            impl DocumentRepository for $ty {
                async fn create_document(&self, scope: &Scope, input: NewDocument) -> Result<Document> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.create_document(&scope, input, now))
                        .await
                }

                async fn get_document(&self, scope: &Scope, id: &str) -> Result<Document> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.document(&scope, id).cloned())
                }

                async fn list_documents(
                    &self,
                    scope: &Scope,
                    options: ListOptions,
                ) -> Result<Vec<Document>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| Ok(state.list_documents(&scope, &options)))
                }
            }

            #[async_trait]
            impl AgreementRepository for $ty {
                async fn create_draft(&self, scope: &Scope, input: NewAgreement) -> Result<Agreement> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.create_draft(&scope, input, now))
                        .await
                }

                async fn get_agreement(&self, scope: &Scope, id: &str) -> Result<Agreement> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.agreement(&scope, id).cloned())
                }

                async fn list_agreements(
                    &self,
                    scope: &Scope,
                    filter: AgreementFilter,
                    options: ListOptions,
                ) -> Result<Page<Agreement>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_agreements(&scope, &filter, &options))
                }

                async fn update_draft(
                    &self,
                    scope: &Scope,
                    id: &str,
                    patch: AgreementPatch,
                    expected_version: i64,
                ) -> Result<Agreement> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.update_draft(&scope, &id, patch, expected_version, now)
                    })
                    .await
                }

                async fn transition(
                    &self,
                    scope: &Scope,
                    id: &str,
                    transition: AgreementTransition,
                ) -> Result<Agreement> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| state.transition(&scope, &id, transition, now))
                        .await
                }
            }

            #[async_trait]
            impl RecipientRepository for $ty {
                async fn upsert_recipient_draft(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    draft: RecipientDraft,
                ) -> Result<Recipient> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.upsert_recipient_draft(&scope, &agreement_id, draft, now)
                    })
                    .await
                }

                async fn delete_recipient_draft(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                ) -> Result<()> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let recipient_id = recipient_id.to_string();
                    self.write_state(move |state| {
                        state.delete_recipient_draft(&scope, &agreement_id, &recipient_id)
                    })
                    .await
                }

                async fn get_recipient(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                ) -> Result<Recipient> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.recipient(&scope, agreement_id, recipient_id).cloned()
                    })
                }

                async fn list_recipients(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                ) -> Result<Vec<Recipient>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_recipients(&scope, agreement_id))
                }

                async fn touch_recipient_view(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                    at: DateTime<Utc>,
                ) -> Result<Recipient> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let recipient_id = recipient_id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.touch_recipient_view(&scope, &agreement_id, &recipient_id, at, now)
                    })
                    .await
                }

                async fn complete_recipient(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                    completion: RecipientCompletion,
                ) -> Result<Recipient> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let recipient_id = recipient_id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.complete_recipient(&scope, &agreement_id, &recipient_id, completion, now)
                    })
                    .await
                }

                async fn decline_recipient(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                    decline: RecipientDecline,
                ) -> Result<Recipient> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let recipient_id = recipient_id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.decline_recipient(&scope, &agreement_id, &recipient_id, decline, now)
                    })
                    .await
                }
            }

            #[async_trait]
            impl FieldRepository for $ty {
                async fn upsert_field_draft(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    draft: FieldDraft,
                ) -> Result<Field> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.upsert_field_draft(&scope, &agreement_id, draft, now)
                    })
                    .await
                }

                async fn delete_field_draft(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    field_id: &str,
                ) -> Result<()> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let field_id = field_id.to_string();
                    self.write_state(move |state| {
                        state.delete_field_draft(&scope, &agreement_id, &field_id)
                    })
                    .await
                }

                async fn get_field(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    field_id: &str,
                ) -> Result<Field> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.field(&scope, agreement_id, field_id).cloned())
                }

                async fn list_fields(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<Field>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_fields(&scope, agreement_id))
                }
            }

            #[async_trait]
            impl FieldValueRepository for $ty {
                async fn upsert_field_value(
                    &self,
                    scope: &Scope,
                    input: FieldValueInput,
                ) -> Result<FieldValue> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.upsert_field_value(&scope, input, now))
                        .await
                }

                async fn list_field_values(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: Option<&str>,
                ) -> Result<Vec<FieldValue>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.list_field_values(&scope, agreement_id, recipient_id)
                    })
                }
            }

            #[async_trait]
            impl SignatureArtifactRepository for $ty {
                async fn create_signature_artifact(
                    &self,
                    scope: &Scope,
                    input: NewSignatureArtifact,
                ) -> Result<SignatureArtifact> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.create_signature_artifact(&scope, input, now)
                    })
                    .await
                }

                async fn get_signature_artifact(
                    &self,
                    scope: &Scope,
                    id: &str,
                ) -> Result<SignatureArtifact> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.signature_artifact(&scope, id).cloned())
                }
            }

            #[async_trait]
            impl AgreementArtifactRepository for $ty {
                async fn save_agreement_artifacts(
                    &self,
                    scope: &Scope,
                    patch: AgreementArtifactPatch,
                ) -> Result<AgreementArtifact> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.save_agreement_artifacts(&scope, patch, now))
                        .await
                }

                async fn get_agreement_artifacts(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                ) -> Result<AgreementArtifact> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.agreement_artifacts(&scope, agreement_id).cloned()
                    })
                }
            }

            #[async_trait]
            impl AuditRepository for $ty {
                async fn append_audit_event(
                    &self,
                    scope: &Scope,
                    input: NewAuditEvent,
                ) -> Result<AuditEvent> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.append_audit_event(&scope, input, now))
                        .await
                }

                async fn list_audit_events(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    options: ListOptions,
                ) -> Result<Vec<AuditEvent>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_audit_events(&scope, agreement_id, &options))
                }

                async fn update_audit_event(
                    &self,
                    scope: &Scope,
                    _event: AuditEvent,
                ) -> Result<AuditEvent> {
                    scope.validate()?;
                    Err(DomainError::AuditEventsAppendOnly)
                }

                async fn delete_audit_event(&self, scope: &Scope, _id: &str) -> Result<()> {
                    scope.validate()?;
                    Err(DomainError::AuditEventsAppendOnly)
                }
            }

            #[async_trait]
            impl SigningTokenRepository for $ty {
                async fn create_signing_token(
                    &self,
                    scope: &Scope,
                    input: NewSigningToken,
                ) -> Result<SigningToken> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.create_signing_token(&scope, input, now))
                        .await
                }

                async fn get_signing_token_by_hash(
                    &self,
                    scope: &Scope,
                    token_hash: &str,
                ) -> Result<SigningToken> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.signing_token_by_hash(&scope, token_hash).cloned())
                }

                async fn revoke_active_signing_tokens(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                    at: DateTime<Utc>,
                ) -> Result<usize> {
                    let scope = scope.validate()?;
                    let agreement_id = agreement_id.to_string();
                    let recipient_id = recipient_id.to_string();
                    self.write_state(move |state| {
                        state.revoke_active_signing_tokens(&scope, &agreement_id, &recipient_id, at)
                    })
                    .await
                }

                async fn list_signing_tokens(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                    recipient_id: &str,
                ) -> Result<Vec<SigningToken>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.list_signing_tokens(&scope, agreement_id, recipient_id)
                    })
                }
            }

            #[async_trait]
            impl JobRunRepository for $ty {
                async fn begin_job_run(&self, scope: &Scope, input: JobRunInput) -> Result<JobRunStart> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.begin_job_run(&scope, input, now))
                        .await
                }

                async fn mark_job_run_succeeded(
                    &self,
                    scope: &Scope,
                    id: &str,
                    at: DateTime<Utc>,
                ) -> Result<JobRun> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    self.write_state(move |state| state.mark_job_run_succeeded(&scope, &id, at))
                        .await
                }

                async fn mark_job_run_failed(
                    &self,
                    scope: &Scope,
                    id: &str,
                    failure: JobRunFailure,
                ) -> Result<JobRun> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    self.write_state(move |state| state.mark_job_run_failed(&scope, &id, failure))
                        .await
                }

                async fn get_job_run(&self, scope: &Scope, id: &str) -> Result<JobRun> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.job_run(&scope, id).cloned())
                }

                async fn get_job_run_by_dedupe(
                    &self,
                    scope: &Scope,
                    job_name: &str,
                    dedupe_key: &str,
                ) -> Result<JobRun> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.job_run_by_dedupe(&scope, job_name, dedupe_key).cloned()
                    })
                }

                async fn list_job_runs(
                    &self,
                    scope: &Scope,
                    job_name: Option<&str>,
                    options: ListOptions,
                ) -> Result<Vec<JobRun>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| Ok(state.list_job_runs(&scope, job_name, &options)))
                }
            }

            #[async_trait]
            impl GoogleImportRunRepository for $ty {
                async fn begin_google_import_run(
                    &self,
                    scope: &Scope,
                    input: ImportRunInput,
                ) -> Result<ImportRunStart> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.begin_google_import_run(&scope, input, now))
                        .await
                }

                async fn mark_google_import_running(
                    &self,
                    scope: &Scope,
                    id: &str,
                    at: DateTime<Utc>,
                ) -> Result<GoogleImportRun> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    self.write_state(move |state| state.mark_google_import_running(&scope, &id, at))
                        .await
                }

                async fn mark_google_import_succeeded(
                    &self,
                    scope: &Scope,
                    id: &str,
                    result: ImportRunResult,
                ) -> Result<GoogleImportRun> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    self.write_state(move |state| {
                        state.mark_google_import_succeeded(&scope, &id, result)
                    })
                    .await
                }

                async fn mark_google_import_failed(
                    &self,
                    scope: &Scope,
                    id: &str,
                    failure: ImportRunFailure,
                ) -> Result<GoogleImportRun> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    self.write_state(move |state| state.mark_google_import_failed(&scope, &id, failure))
                        .await
                }

                async fn get_google_import_run(
                    &self,
                    scope: &Scope,
                    id: &str,
                ) -> Result<GoogleImportRun> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.google_import_run(&scope, id).cloned())
                }

                async fn list_google_import_runs(
                    &self,
                    scope: &Scope,
                    user_id: Option<&str>,
                    options: ListOptions,
                ) -> Result<Page<GoogleImportRun>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_google_import_runs(&scope, user_id, &options))
                }
            }

            #[async_trait]
            impl EmailLogRepository for $ty {
                async fn create_email_log(&self, scope: &Scope, input: NewEmailLog) -> Result<EmailLog> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.create_email_log(&scope, input, now))
                        .await
                }

                async fn mark_email_log_sent(
                    &self,
                    scope: &Scope,
                    id: &str,
                    provider_message_id: &str,
                    at: DateTime<Utc>,
                ) -> Result<EmailLog> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let provider_message_id = provider_message_id.to_string();
                    self.write_state(move |state| {
                        state.mark_email_log_sent(&scope, &id, &provider_message_id, at)
                    })
                    .await
                }

                async fn mark_email_log_failed(
                    &self,
                    scope: &Scope,
                    id: &str,
                    reason: &str,
                    next_retry_at: Option<DateTime<Utc>>,
                    at: DateTime<Utc>,
                ) -> Result<EmailLog> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let reason = reason.to_string();
                    self.write_state(move |state| {
                        state.mark_email_log_failed(&scope, &id, &reason, next_retry_at, at)
                    })
                    .await
                }

                async fn list_email_logs(
                    &self,
                    scope: &Scope,
                    agreement_id: &str,
                ) -> Result<Vec<EmailLog>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| state.list_email_logs(&scope, agreement_id))
                }
            }

            #[async_trait]
            impl IntegrationCredentialRepository for $ty {
                async fn upsert_integration_credential(
                    &self,
                    scope: &Scope,
                    input: NewIntegrationCredential,
                ) -> Result<IntegrationCredential> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| {
                        state.upsert_integration_credential(&scope, input, now)
                    })
                    .await
                }

                async fn get_integration_credential(
                    &self,
                    scope: &Scope,
                    provider: &str,
                    user_id: &str,
                ) -> Result<IntegrationCredential> {
                    let scope = scope.validate()?;
                    self.read_state(|state| {
                        state.integration_credential(&scope, provider, user_id).cloned()
                    })
                }

                async fn delete_integration_credential(
                    &self,
                    scope: &Scope,
                    provider: &str,
                    user_id: &str,
                ) -> Result<()> {
                    let scope = scope.validate()?;
                    let provider = provider.to_string();
                    let user_id = user_id.to_string();
                    self.write_state(move |state| {
                        state.delete_integration_credential(&scope, &provider, &user_id)
                    })
                    .await
                }
            }

            #[async_trait]
            impl OutboxRepository for $ty {
                async fn enqueue_outbox(
                    &self,
                    scope: &Scope,
                    message: NewOutboxMessage,
                ) -> Result<OutboxMessage> {
                    let scope = scope.validate()?;
                    let now = Utc::now();
                    self.write_state(move |state| state.enqueue_outbox(&scope, message, now))
                        .await
                }

                async fn claim_outbox(
                    &self,
                    scope: &Scope,
                    request: ClaimRequest,
                ) -> Result<Vec<OutboxMessage>> {
                    let scope = scope.validate()?;
                    self.write_state(move |state| state.claim_outbox(&scope, request))
                        .await
                }

                async fn mark_outbox_succeeded(
                    &self,
                    scope: &Scope,
                    id: &str,
                    consumer: &str,
                    now: DateTime<Utc>,
                ) -> Result<OutboxMessage> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let consumer = consumer.to_string();
                    self.write_state(move |state| {
                        state.mark_outbox_succeeded(&scope, &id, &consumer, now)
                    })
                    .await
                }

                async fn mark_outbox_failed(
                    &self,
                    scope: &Scope,
                    id: &str,
                    consumer: &str,
                    reason: &str,
                    next_attempt_at: Option<DateTime<Utc>>,
                    now: DateTime<Utc>,
                ) -> Result<OutboxMessage> {
                    let scope = scope.validate()?;
                    let id = id.to_string();
                    let consumer = consumer.to_string();
                    let reason = reason.to_string();
                    self.write_state(move |state| {
                        state.mark_outbox_failed(
                            &scope,
                            &id,
                            &consumer,
                            &reason,
                            next_attempt_at,
                            now,
                        )
                    })
                    .await
                }

                async fn list_outbox(
                    &self,
                    scope: &Scope,
                    query: OutboxQuery,
                ) -> Result<Vec<OutboxMessage>> {
                    let scope = scope.validate()?;
                    self.read_state(|state| Ok(state.list_outbox(&scope, &query)))
                }

                async fn release_stale_outbox_claims(
                    &self,
                    scope: &Scope,
                    locked_before: DateTime<Utc>,
                    now: DateTime<Utc>,
                ) -> Result<usize> {
                    let scope = scope.validate()?;
                    self.write_state(move |state| {
                        Ok(state.release_stale_outbox_claims(&scope, locked_before, now))
                    })
                    .await
                }

                async fn outbox_stats(&self, scope: &Scope) -> Result<OutboxStats> {
                    let scope = scope.validate()?;
                    self.read_state(|state| Ok(state.outbox_stats(&scope)))
                }

                async fn purge_succeeded_outbox(
                    &self,
                    scope: &Scope,
                    published_before: DateTime<Utc>,
                ) -> Result<usize> {
                    let scope = scope.validate()?;
                    self.write_state(move |state| {
                        Ok(state.purge_succeeded_outbox(&scope, published_before))
                    })
                    .await
                }
            }
        };
    };
}

pub(crate) use impl_store_facets;
