use chrono::{DateTime, Utc};
use esign_server_domain::agreements::{
    AgreementArtifact, AgreementArtifactPatch, NewSignatureArtifact, SignatureArtifact,
};
use esign_server_domain::{DomainError, Result, Scope, normalize_id, require_text, resolve_time};

use super::state::{StoreState, ensure_free, lookup};

impl StoreState {
    pub(crate) fn signature_artifact(&self, scope: &Scope, id: &str) -> Result<&SignatureArtifact> {
        lookup(&self.signature_artifacts, scope, "signature_artifact", id)
    }

    pub(crate) fn create_signature_artifact(
        &mut self,
        scope: &Scope,
        input: NewSignatureArtifact,
        now: DateTime<Utc>,
    ) -> Result<SignatureArtifact> {
        let agreement_id =
            require_text("signature_artifact", "agreement_id", &input.agreement_id)?;
        let recipient_id =
            require_text("signature_artifact", "recipient_id", &input.recipient_id)?;
        let artifact_type =
            require_text("signature_artifact", "artifact_type", &input.artifact_type)?;
        let object_key = require_text("signature_artifact", "object_key", &input.object_key)?;
        let sha256 = require_text("signature_artifact", "sha256", &input.sha256)?;
        self.recipient(scope, &agreement_id, &recipient_id)?;

        let id = normalize_id(input.id.as_deref());
        ensure_free(&self.signature_artifacts, scope, "signature_artifact", &id)?;
        let artifact = SignatureArtifact {
            id: id.clone(),
            scope: scope.clone(),
            agreement_id,
            recipient_id,
            artifact_type,
            object_key,
            sha256,
            created_at: resolve_time(input.created_at, now),
        };
        self.signature_artifacts.insert(id, artifact.clone());
        Ok(artifact)
    }

    pub(crate) fn save_agreement_artifacts(
        &mut self,
        scope: &Scope,
        patch: AgreementArtifactPatch,
        now: DateTime<Utc>,
    ) -> Result<AgreementArtifact> {
        let agreement_id = self.agreement(scope, &patch.agreement_id)?.id.clone();
        let mut artifact = match self.agreement_artifacts.get(&agreement_id) {
            Some(existing) => existing.clone(),
            None => AgreementArtifact {
                agreement_id: agreement_id.clone(),
                scope: scope.clone(),
                created_at: now,
                updated_at: now,
                ..AgreementArtifact::default()
            },
        };
        artifact.merge(&patch, now)?;
        self.agreement_artifacts
            .insert(agreement_id, artifact.clone());
        Ok(artifact)
    }

    pub(crate) fn agreement_artifacts(
        &self,
        scope: &Scope,
        agreement_id: &str,
    ) -> Result<&AgreementArtifact> {
        let agreement = self.agreement(scope, agreement_id)?;
        self.agreement_artifacts
            .get(&agreement.id)
            .ok_or_else(|| DomainError::not_found("agreement_artifact", agreement.id.clone()))
    }
}
