use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared_kernel::{DomainError, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Signature,
    Name,
    DateSigned,
    Text,
    Checkbox,
    Initials,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Signature => "signature",
            FieldType::Name => "name",
            FieldType::DateSigned => "date_signed",
            FieldType::Text => "text",
            FieldType::Checkbox => "checkbox",
            FieldType::Initials => "initials",
        }
    }

    /// Types that must be assigned to a signer recipient.
    pub fn is_signer_bound(&self) -> bool {
        matches!(
            self,
            FieldType::Signature | FieldType::Name | FieldType::DateSigned | FieldType::Initials
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement of an input on a document page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub recipient_id: Option<String>,
    pub field_type: FieldType,
    pub page_number: i32,
    pub pos_x: f64,
    pub pos_y: f64,
    pub width: f64,
    pub height: f64,
    pub required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for Field {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

#[derive(Debug, Clone)]
pub struct FieldDraft {
    pub id: Option<String>,
    pub recipient_id: Option<String>,
    pub field_type: FieldType,
    pub page_number: i32,
    pub pos_x: f64,
    pub pos_y: f64,
    pub width: f64,
    pub height: f64,
    pub required: bool,
}

impl FieldDraft {
    /// Geometry checks; `date_signed` is forced to required.
    pub fn validated(mut self) -> Result<Self> {
        if self.page_number < 1 {
            return Err(DomainError::missing("field", "page_number", "must be >= 1"));
        }
        if !positive(self.width) {
            return Err(DomainError::missing("field", "width", "must be > 0"));
        }
        if !positive(self.height) {
            return Err(DomainError::missing("field", "height", "must be > 0"));
        }
        if !non_negative(self.pos_x) || !non_negative(self.pos_y) {
            return Err(DomainError::missing("field", "position", "must be >= 0"));
        }
        if self.field_type == FieldType::DateSigned {
            self.required = true;
        }
        self.recipient_id = self
            .recipient_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if self.field_type.is_signer_bound() && self.recipient_id.is_none() {
            return Err(DomainError::missing(
                "field",
                "recipient_id",
                format!("{} fields require a signer recipient", self.field_type),
            ));
        }
        Ok(self)
    }
}

/// Signer-entered value, unique per `(agreement, recipient, field)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub recipient_id: String,
    pub field_id: String,
    pub value_text: Option<String>,
    pub value_bool: Option<bool>,
    pub signature_artifact_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for FieldValue {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldValueInput {
    /// Replaced by the stored id when a value already exists for the key.
    pub id: Option<String>,
    pub agreement_id: String,
    pub recipient_id: String,
    pub field_id: String,
    pub value_text: Option<String>,
    pub value_bool: Option<bool>,
    pub signature_artifact_id: Option<String>,
    pub expected_version: i64,
}
