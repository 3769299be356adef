use chrono::{DateTime, Utc};
use esign_server_domain::agreements::{
    Field, FieldDraft, FieldValue, FieldValueInput, RecipientRole, check_version,
};
use esign_server_domain::{DomainError, Result, Scope, normalize_id, require_text};

use super::state::{StoreState, ensure_free, ensure_parent, lookup, optional_text};

impl StoreState {
    pub(crate) fn field(&self, scope: &Scope, agreement_id: &str, field_id: &str) -> Result<&Field> {
        let agreement = self.agreement(scope, agreement_id)?;
        let field = lookup(&self.fields, scope, "field", field_id)?;
        ensure_parent("field", &field.id, &field.agreement_id, &agreement.id)?;
        Ok(field)
    }

    pub(crate) fn upsert_field_draft(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        draft: FieldDraft,
        now: DateTime<Utc>,
    ) -> Result<Field> {
        let agreement_id = self.draft_agreement(scope, agreement_id)?.id.clone();
        let draft = draft.validated()?;
        if let Some(recipient_id) = &draft.recipient_id {
            let recipient = self.recipient(scope, &agreement_id, recipient_id)?;
            if draft.field_type.is_signer_bound() && recipient.role != RecipientRole::Signer {
                return Err(DomainError::missing(
                    "field",
                    "recipient_id",
                    format!("{} fields must be assigned to a signer", draft.field_type),
                ));
            }
        }

        let existing = match optional_text(draft.id.clone()) {
            Some(id) if self.fields.contains_key(&id) => {
                Some(self.field(scope, &agreement_id, &id)?.clone())
            }
            _ => None,
        };
        let field = match existing {
            Some(field) => Field {
                recipient_id: draft.recipient_id,
                field_type: draft.field_type,
                page_number: draft.page_number,
                pos_x: draft.pos_x,
                pos_y: draft.pos_y,
                width: draft.width,
                height: draft.height,
                required: draft.required,
                updated_at: now,
                ..field
            },
            None => {
                let id = normalize_id(draft.id.as_deref());
                ensure_free(&self.fields, scope, "field", &id)?;
                Field {
                    id,
                    scope: scope.clone(),
                    agreement_id,
                    recipient_id: draft.recipient_id,
                    field_type: draft.field_type,
                    page_number: draft.page_number,
                    pos_x: draft.pos_x,
                    pos_y: draft.pos_y,
                    width: draft.width,
                    height: draft.height,
                    required: draft.required,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        self.fields.insert(field.id.clone(), field.clone());
        Ok(field)
    }

    pub(crate) fn delete_field_draft(
        &mut self,
        scope: &Scope,
        agreement_id: &str,
        field_id: &str,
    ) -> Result<()> {
        self.draft_agreement(scope, agreement_id)?;
        let id = self.field(scope, agreement_id, field_id)?.id.clone();
        self.fields.remove(&id);
        self.field_values.retain(|_, v| v.field_id != id);
        Ok(())
    }

    pub(crate) fn list_fields(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<Field>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let mut fields: Vec<Field> = self
            .fields
            .values()
            .filter(|f| f.agreement_id == agreement.id)
            .cloned()
            .collect();
        fields.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(fields)
    }

    pub(crate) fn upsert_field_value(
        &mut self,
        scope: &Scope,
        input: FieldValueInput,
        now: DateTime<Utc>,
    ) -> Result<FieldValue> {
        let agreement_id = require_text("field_value", "agreement_id", &input.agreement_id)?;
        let recipient_id = require_text("field_value", "recipient_id", &input.recipient_id)?;
        let field_id = require_text("field_value", "field_id", &input.field_id)?;

        self.agreement(scope, &agreement_id)?
            .ensure_signer_actions()?;
        let recipient = self.recipient(scope, &agreement_id, &recipient_id)?;
        if recipient.is_finished() {
            return Err(DomainError::InvalidSignerState {
                message: format!("recipient {} has already finished", recipient.id),
            });
        }
        let field = self.field(scope, &agreement_id, &field_id)?;
        if field
            .recipient_id
            .as_deref()
            .is_some_and(|owner| owner != recipient_id)
        {
            return Err(DomainError::InvalidSignerState {
                message: format!("field {} is assigned to another recipient", field.id),
            });
        }

        let signature_artifact_id = optional_text(input.signature_artifact_id);
        if let Some(artifact_id) = &signature_artifact_id {
            let artifact = lookup(
                &self.signature_artifacts,
                scope,
                "signature_artifact",
                artifact_id,
            )?;
            if artifact.agreement_id != agreement_id || artifact.recipient_id != recipient_id {
                return Err(DomainError::missing(
                    "field_value",
                    "signature_artifact_id",
                    "artifact belongs to another agreement or recipient",
                ));
            }
        }

        let existing = self
            .field_values
            .values()
            .find(|v| {
                v.agreement_id == agreement_id
                    && v.recipient_id == recipient_id
                    && v.field_id == field_id
            })
            .cloned();
        let value = match existing {
            Some(mut value) => {
                check_version("field_value", &value.id, input.expected_version, value.version)?;
                value.value_text = input.value_text;
                value.value_bool = input.value_bool;
                value.signature_artifact_id = signature_artifact_id;
                value.version += 1;
                value.updated_at = now;
                value
            }
            None => {
                let id = normalize_id(input.id.as_deref());
                check_version("field_value", &id, input.expected_version, 0)?;
                ensure_free(&self.field_values, scope, "field_value", &id)?;
                FieldValue {
                    id,
                    scope: scope.clone(),
                    agreement_id,
                    recipient_id,
                    field_id,
                    value_text: input.value_text,
                    value_bool: input.value_bool,
                    signature_artifact_id,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        self.field_values.insert(value.id.clone(), value.clone());
        Ok(value)
    }

    pub(crate) fn list_field_values(
        &self,
        scope: &Scope,
        agreement_id: &str,
        recipient_id: Option<&str>,
    ) -> Result<Vec<FieldValue>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let recipient_id = recipient_id.map(str::trim).filter(|id| !id.is_empty());
        let mut values: Vec<FieldValue> = self
            .field_values
            .values()
            .filter(|v| {
                v.agreement_id == agreement.id
                    && recipient_id.is_none_or(|id| v.recipient_id == id)
            })
            .cloned()
            .collect();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(values)
    }
}
