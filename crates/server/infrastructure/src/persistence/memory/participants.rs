use chrono::{DateTime, Utc};
use esign_server_domain::agreements::{
    Recipient, RecipientCompletion, RecipientDecline, RecipientDraft, RecipientRole,
    check_version, normalize_email,
};
use esign_server_domain::{DomainError, Result, Scope, normalize_id, resolve_time};

use super::state::{StoreState, ensure_free, ensure_parent, lookup, optional_text};

impl StoreState {
    pub(crate) fn recipient(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<&Recipient> {
        let agreement = self.agreement(scope, agreement_id)?;
        let recipient = lookup(&self.recipients, scope, "recipient", recipient_id)?;
        ensure_parent(
            "recipient",
            &recipient.id,
            &recipient.agreement_id,
            &agreement.id,
        )?;
        Ok(recipient)
    }

    pub(crate) fn upsert_recipient_draft(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        draft: RecipientDraft,
        now: DateTime<Utc>,
    ) -> Result<Recipient> {
        let agreement_id = self.draft_agreement(scope, agreement_id)?.id.clone();
        let email = normalize_email(&draft.email)?;
        if draft.signing_order < 1 {
            return Err(DomainError::missing(
                "recipient",
                "signing_order",
                "must be >= 1",
            ));
        }

        let existing = match optional_text(draft.id.clone()) {
            Some(id) if self.recipients.contains_key(&id) => {
                Some(self.recipient(scope, &agreement_id, &id)?.clone())
            }
            _ => None,
        };
        let current_version = existing.as_ref().map_or(0, |r| r.version);
        let id = existing
            .as_ref()
            .map_or_else(|| normalize_id(draft.id.as_deref()), |r| r.id.clone());
        check_version("recipient", &id, draft.expected_version, current_version)?;

        // Signing order only sequences signers; cc recipients may share it.
        let order_taken = draft.role == RecipientRole::Signer
            && self.recipients.values().any(|r| {
                r.agreement_id == agreement_id
                    && r.id != id
                    && r.role == RecipientRole::Signer
                    && r.signing_order == draft.signing_order
            });
        if order_taken {
            return Err(DomainError::missing(
                "recipient",
                "signing_order",
                "must be unique per agreement",
            ));
        }

        if existing
            .as_ref()
            .is_some_and(|r| r.role == RecipientRole::Signer && draft.role != RecipientRole::Signer)
        {
            if let Some(field) = self.fields.values().find(|f| {
                f.recipient_id.as_deref() == Some(id.as_str()) && f.field_type.is_signer_bound()
            }) {
                return Err(DomainError::missing(
                    "field",
                    "recipient_id",
                    format!("{} fields must be assigned to a signer", field.field_type),
                ));
            }
        }

        let recipient = match existing {
            Some(mut recipient) => {
                recipient.email = email;
                recipient.name = draft.name.trim().to_string();
                recipient.role = draft.role;
                recipient.signing_order = draft.signing_order;
                recipient.version += 1;
                recipient.updated_at = now;
                recipient
            }
            None => {
                ensure_free(&self.recipients, scope, "recipient", &id)?;
                Recipient {
                    id: id.clone(),
                    scope: scope.clone(),
                    agreement_id,
                    email,
                    name: draft.name.trim().to_string(),
                    role: draft.role,
                    signing_order: draft.signing_order,
                    first_view_at: None,
                    last_view_at: None,
                    declined_at: None,
                    decline_reason: String::new(),
                    completed_at: None,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        self.recipients.insert(id, recipient.clone());
        Ok(recipient)
    }

    pub(crate) fn delete_recipient_draft(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
    ) -> Result<()> {
        self.draft_agreement(scope, agreement_id)?;
        let id = self.recipient(scope, agreement_id, recipient_id)?.id.clone();
        self.recipients.remove(&id);

        let orphaned: Vec<String> = self
            .fields
            .values()
            .filter(|f| f.recipient_id.as_deref() == Some(id.as_str()))
            .map(|f| f.id.clone())
            .collect();
        for field_id in &orphaned {
            self.fields.remove(field_id);
        }
        self.field_values
            .retain(|_, v| v.recipient_id != id && !orphaned.contains(&v.field_id));
        Ok(())
    }

    pub(crate) fn list_recipients(
        &self,
        scope: &Scope,
        agreement_id: &str,
    ) -> Result<Vec<Recipient>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let mut recipients: Vec<Recipient> = self
            .recipients
            .values()
            .filter(|r| r.agreement_id == agreement.id)
            .cloned()
            .collect();
        recipients.sort_by(|a, b| {
            a.signing_order
                .cmp(&b.signing_order)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(recipients)
    }

    pub(crate) fn touch_recipient_view(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Recipient> {
        self.agreement(scope, agreement_id)?
            .ensure_signer_actions()?;
        let mut recipient = self.recipient(scope, agreement_id, recipient_id)?.clone();
        let at = resolve_time(Some(at), now);
        recipient.first_view_at.get_or_insert(at);
        recipient.last_view_at = Some(at);
        recipient.version += 1;
        recipient.updated_at = now;
        self.recipients
            .insert(recipient.id.clone(), recipient.clone());
        Ok(recipient)
    }

    /// Shared gate for complete and decline.
    fn finishing_recipient(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        expected_version: i64,
    ) -> Result<Recipient> {
        self.agreement(scope, agreement_id)?
            .ensure_signer_actions()?;
        let recipient = self.recipient(scope, agreement_id, recipient_id)?;
        check_version(
            "recipient",
            &recipient.id,
            expected_version,
            recipient.version,
        )?;
        if recipient.role != RecipientRole::Signer {
            return Err(DomainError::InvalidSignerState {
                message: format!("recipient {} is {}, not a signer", recipient.id, recipient.role),
            });
        }
        recipient.ensure_can_finish()?;
        Ok(recipient.clone())
    }

    pub(crate) fn complete_recipient(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        completion: RecipientCompletion,
        now: DateTime<Utc>,
    ) -> Result<Recipient> {
        let mut recipient =
            self.finishing_recipient(scope, agreement_id, recipient_id, completion.expected_version)?;
        recipient.completed_at = Some(resolve_time(completion.at, now));
        recipient.version += 1;
        recipient.updated_at = now;
        self.recipients
            .insert(recipient.id.clone(), recipient.clone());
        Ok(recipient)
    }

    pub(crate) fn decline_recipient(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: &str,
        decline: RecipientDecline,
        now: DateTime<Utc>,
    ) -> Result<Recipient> {
        let mut recipient =
            self.finishing_recipient(scope, agreement_id, recipient_id, decline.expected_version)?;
        recipient.declined_at = Some(resolve_time(decline.at, now));
        recipient.decline_reason = decline.reason.trim().to_string();
        recipient.version += 1;
        recipient.updated_at = now;
        self.recipients
            .insert(recipient.id.clone(), recipient.clone());
        Ok(recipient)
    }
}
