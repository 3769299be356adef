use chrono::{DateTime, Utc};
use esign_server_domain::agreements::{
    Agreement, AgreementFilter, AgreementPatch, AgreementStatus, AgreementTransition,
    NewAgreement, check_version,
};
use esign_server_domain::{
    DomainError, ListOptions, Page, Result, Scope, normalize_id, paginate, require_text,
    resolve_time,
};
use tracing::debug;

use super::state::{StoreState, ensure_free, lookup};

impl StoreState {
    pub(crate) fn agreement(&self, scope: &Scope, id: &str) -> Result<&Agreement> {
        lookup(&self.agreements, scope, "agreement", id)
    }

    /// The agreement, provided it still accepts draft writes.
    pub(crate) fn draft_agreement(&self, scope: &Scope, id: &str) -> Result<&Agreement> {
        let agreement = self.agreement(scope, id)?;
        agreement.ensure_draft()?;
        Ok(agreement)
    }

    pub(crate) fn create_draft(
        &mut self,
        scope: &Scope,
        input: NewAgreement,
        now: DateTime<Utc>,
    ) -> Result<Agreement> {
        if let Some(status) = input.status {
            if status != AgreementStatus::Draft {
                return Err(DomainError::missing(
                    "agreement",
                    "status",
                    "agreements are created as draft",
                ));
            }
        }
        let document_id = require_text("agreement", "document_id", &input.document_id)?;
        let title = require_text("agreement", "title", &input.title)?;
        self.document(scope, &document_id)?;

        let id = normalize_id(input.id.as_deref());
        ensure_free(&self.agreements, scope, "agreement", &id)?;
        let created_at = resolve_time(input.created_at, now);
        let agreement = Agreement {
            id: id.clone(),
            scope: scope.clone(),
            document_id,
            status: AgreementStatus::Draft,
            title,
            message: input.message.trim().to_string(),
            version: 1,
            sent_at: None,
            completed_at: None,
            voided_at: None,
            declined_at: None,
            expired_at: None,
            created_at,
            updated_at: created_at,
        };
        debug!(agreement_id = %id, scope = %scope, "Created draft agreement");
        self.agreements.insert(id, agreement.clone());
        Ok(agreement)
    }

    pub(crate) fn list_agreements(
        &self,
        scope: &Scope,
        filter: &AgreementFilter,
        options: &ListOptions,
    ) -> Result<Page<Agreement>> {
        paginate(
            self.agreements.values().filter(|a| {
                &a.scope == scope && filter.status.is_none_or(|status| a.status == status)
            }),
            options,
        )
    }

    pub(crate) fn update_draft(
        &mut self,
        scope: &Scope,
        id: &str,
        patch: AgreementPatch,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<Agreement> {
        let mut agreement = self.draft_agreement(scope, id)?.clone();
        check_version("agreement", &agreement.id, expected_version, agreement.version)?;
        if let Some(title) = patch.title {
            agreement.title = require_text("agreement", "title", &title)?;
        }
        if let Some(message) = patch.message {
            agreement.message = message.trim().to_string();
        }
        if let Some(document_id) = patch.document_id {
            let document_id = require_text("agreement", "document_id", &document_id)?;
            self.document(scope, &document_id)?;
            agreement.document_id = document_id;
        }
        agreement.version += 1;
        agreement.updated_at = now;
        self.agreements
            .insert(agreement.id.clone(), agreement.clone());
        Ok(agreement)
    }

    pub(crate) fn transition(
        &mut self,
        scope: &Scope,
        id: &str,
        transition: AgreementTransition,
        now: DateTime<Utc>,
    ) -> Result<Agreement> {
        let mut agreement = self.agreement(scope, id)?.clone();
        check_version(
            "agreement",
            &agreement.id,
            transition.expected_version,
            agreement.version,
        )?;
        let from = agreement.status;
        agreement.apply_transition(transition.to, resolve_time(transition.at, now));
        debug!(
            agreement_id = %agreement.id,
            from = %from,
            to = %agreement.status,
            version = agreement.version,
            "Agreement transitioned"
        );
        self.agreements
            .insert(agreement.id.clone(), agreement.clone());
        Ok(agreement)
    }
}
