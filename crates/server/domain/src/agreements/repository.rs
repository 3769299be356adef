//! Store facets for the agreement aggregate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    Agreement, AgreementArtifact, AgreementArtifactPatch, AgreementFilter, AgreementPatch,
    AgreementTransition, Field, FieldDraft, FieldValue, FieldValueInput, NewAgreement,
    NewSignatureArtifact, Recipient, RecipientCompletion, RecipientDecline, RecipientDraft,
    SignatureArtifact,
};
use crate::shared_kernel::{ListOptions, Page, Result, Scope};

#[async_trait]
pub trait AgreementRepository: Send + Sync {
    /// Insert with `status = draft` and `version = 1`.
    async fn create_draft(&self, scope: &Scope, input: NewAgreement) -> Result<Agreement>;

    async fn get_agreement(&self, scope: &Scope, id: &str) -> Result<Agreement>;

    /// Cursor-paginated by `created_at`, then id.
    async fn list_agreements(
        &self,
        scope: &Scope,
        filter: AgreementFilter,
        options: ListOptions,
    ) -> Result<Page<Agreement>>;

    async fn update_draft(
        &self,
        scope: &Scope,
        id: &str,
        patch: AgreementPatch,
        expected_version: i64,
    ) -> Result<Agreement>;

    /// Status change without legality checks; callers own the state machine.
    async fn transition(
        &self,
        scope: &Scope,
        id: &str,
        transition: AgreementTransition,
    ) -> Result<Agreement>;
}

#[async_trait]
pub trait RecipientRepository: Send + Sync {
    async fn upsert_recipient_draft(
        &self,
        scope: &Scope,
        agreement_id: &str,
        draft: RecipientDraft,
    ) -> Result<Recipient>;

    /// Cascades to the recipient's fields and field values.
    async fn delete_recipient_draft(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<()>;

    async fn get_recipient(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<Recipient>;

    /// Ordered by `signing_order`, then id.
    async fn list_recipients(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<Recipient>>;

    async fn touch_recipient_view(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Recipient>;

    async fn complete_recipient(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        completion: RecipientCompletion,
    ) -> Result<Recipient>;

    async fn decline_recipient(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        decline: RecipientDecline,
    ) -> Result<Recipient>;
}

#[async_trait]
pub trait FieldRepository: Send + Sync {
    async fn upsert_field_draft(
        &self,
        scope: &Scope,
        agreement_id: &str,
        draft: FieldDraft,
    ) -> Result<Field>;

    /// Cascades to the field's values.
    async fn delete_field_draft(
        &self,
        scope: &Scope,
        agreement_id: &str,
        field_id: &str,
    ) -> Result<()>;

    async fn get_field(&self, scope: &Scope, agreement_id: &str, field_id: &str) -> Result<Field>;

    /// Ordered by page, then `created_at`, then id.
    async fn list_fields(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<Field>>;
}

#[async_trait]
pub trait FieldValueRepository: Send + Sync {
    /// Keyed by `(agreement, recipient, field)`.
    async fn upsert_field_value(&self, scope: &Scope, input: FieldValueInput)
    -> Result<FieldValue>;

    async fn list_field_values(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: Option<&str>,
    ) -> Result<Vec<FieldValue>>;
}

#[async_trait]
pub trait SignatureArtifactRepository: Send + Sync {
    async fn create_signature_artifact(
        &self,
        scope: &Scope,
        input: NewSignatureArtifact,
    ) -> Result<SignatureArtifact>;

    async fn get_signature_artifact(&self, scope: &Scope, id: &str) -> Result<SignatureArtifact>;
}

#[async_trait]
pub trait AgreementArtifactRepository: Send + Sync {
    async fn save_agreement_artifacts(
        &self,
        scope: &Scope,
        patch: AgreementArtifactPatch,
    ) -> Result<AgreementArtifact>;

    async fn get_agreement_artifacts(
        &self,
        scope: &Scope,
        agreement_id: &str,
    ) -> Result<AgreementArtifact>;
}
