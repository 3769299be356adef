//! Object write admission
//!
//! Writes that record an object key pass through [`ObjectWriteGate`], which
//! checks the key against the caller's tenant and the server-side
//! encryption the object was stored with before the metadata reaches the
//! store. The store facets record keys as given.

use esign_server_domain::agreements::{
    AgreementArtifact, AgreementArtifactPatch, AgreementArtifactRepository, NewSignatureArtifact,
    SignatureArtifact, SignatureArtifactRepository,
};
use esign_server_domain::documents::{Document, DocumentRepository, NewDocument};
use esign_server_domain::policy::ObjectStorageSecurityPolicy;
use esign_server_domain::{Result, Scope};
use std::sync::Arc;
use tracing::warn;

pub struct ObjectWriteGate<S: ?Sized> {
    store: Arc<S>,
    policy: ObjectStorageSecurityPolicy,
}

impl<S: ?Sized> std::fmt::Debug for ObjectWriteGate<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWriteGate")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S> ObjectWriteGate<S>
where
    S: DocumentRepository + SignatureArtifactRepository + AgreementArtifactRepository + ?Sized,
{
    pub fn new(store: Arc<S>, policy: ObjectStorageSecurityPolicy) -> Self {
        Self { store, policy }
    }

    /// `encryption` is the server-side encryption algorithm reported by the
    /// object store for the uploaded source PDF.
    pub async fn create_document(
        &self,
        scope: &Scope,
        input: NewDocument,
        encryption: &str,
    ) -> Result<Document> {
        self.admit(scope, &input.source_object_key, encryption)?;
        self.store.create_document(scope, input).await
    }

    pub async fn create_signature_artifact(
        &self,
        scope: &Scope,
        input: NewSignatureArtifact,
        encryption: &str,
    ) -> Result<SignatureArtifact> {
        self.admit(scope, &input.object_key, encryption)?;
        self.store.create_signature_artifact(scope, input).await
    }

    /// Only the keys present in the patch are checked.
    pub async fn save_agreement_artifacts(
        &self,
        scope: &Scope,
        patch: AgreementArtifactPatch,
        encryption: &str,
    ) -> Result<AgreementArtifact> {
        for key in [&patch.executed_object_key, &patch.certificate_object_key] {
            if !key.trim().is_empty() {
                self.admit(scope, key, encryption)?;
            }
        }
        self.store.save_agreement_artifacts(scope, patch).await
    }

    fn admit(&self, scope: &Scope, object_key: &str, encryption: &str) -> Result<()> {
        let scope = scope.validate()?;
        self.policy
            .validate_scoped_object_write(&scope, object_key, encryption)
            .inspect_err(|err| {
                warn!(
                    scope = %scope,
                    object_key = %object_key.trim(),
                    code = %err.code(),
                    "Object write rejected"
                );
            })
    }
}
