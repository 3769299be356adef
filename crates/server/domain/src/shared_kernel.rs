//! Shared kernel: scope, identifiers, pagination and the coded error taxonomy
//! used by every bounded context of the e-sign core.

pub mod ids;
pub mod pagination;
pub mod scope;

pub use ids::*;
pub use pagination::*;
pub use scope::*;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable error codes. Callers branch on these, never on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ScopeDenied,
    ScopeRequired,
    MissingRequiredFields,
    NotFound,
    AgreementImmutable,
    VersionConflict,
    InvalidSignerState,
    AuditEventsAppendOnly,
    TokenInvalid,
    TokenExpired,
    TokenRevoked,
    RateLimited,
    StorageEncryptionRequired,
    InvalidTransition,
    Infrastructure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ScopeDenied => "SCOPE_DENIED",
            ErrorCode::ScopeRequired => "SCOPE_REQUIRED",
            ErrorCode::MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AgreementImmutable => "AGREEMENT_IMMUTABLE",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::InvalidSignerState => "INVALID_SIGNER_STATE",
            ErrorCode::AuditEventsAppendOnly => "AUDIT_EVENTS_APPEND_ONLY",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::StorageEncryptionRequired => "STORAGE_ENCRYPTION_REQUIRED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::Infrastructure => "INFRASTRUCTURE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classification used by boundaries to pick a response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Validation,
    Authz,
    NotFound,
    Conflict,
    RateLimit,
    BadInput,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authz => "authz",
            ErrorCategory::NotFound => "not-found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::BadInput => "bad-input",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the e-sign domain
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Scope denied for {entity} {id}")]
    ScopeDenied { entity: String, id: String },

    #[error("Scope requires a non-empty {field}")]
    ScopeRequired { field: String },

    #[error("Missing or invalid {entity}.{field}: {reason}")]
    MissingRequiredFields {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Agreement {agreement_id} is immutable in status {status}")]
    AgreementImmutable { agreement_id: String, status: String },

    #[error("Version conflict on {entity} {id}: expected {expected}, actual {actual}")]
    VersionConflict {
        entity: String,
        id: String,
        expected: i64,
        actual: i64,
    },

    #[error("Invalid signer state: {message}")]
    InvalidSignerState { message: String },

    #[error("Audit events are append-only")]
    AuditEventsAppendOnly,

    #[error("Signing token is invalid")]
    TokenInvalid,

    #[error("Signing token {token_id} has expired")]
    TokenExpired { token_id: String },

    #[error("Signing token {token_id} has been revoked")]
    TokenRevoked { token_id: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Storage encryption required for object {object_key}")]
    StorageEncryptionRequired { object_key: String },

    #[error("Invalid {entity} transition for {id}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    #[error("Infrastructure error: {message}")]
    Infrastructure { message: String },

    /// The write took effect but could not be made durable. Retrying it
    /// would apply it twice.
    #[error("Write applied but not persisted: {message}")]
    NotPersisted { message: String },

    #[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Joined(Vec<DomainError>),
}

pub type Result<T> = std::result::Result<T, DomainError>;

impl DomainError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        DomainError::NotFound {
            entity: entity.to_string(),
            id: id.into(),
        }
    }

    pub fn missing(entity: &str, field: &str, reason: impl Into<String>) -> Self {
        DomainError::MissingRequiredFields {
            entity: entity.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        DomainError::Infrastructure {
            message: message.into(),
        }
    }

    /// Join several errors into one. Nested joins are flattened; a single
    /// error is returned as is.
    pub fn join(errors: impl IntoIterator<Item = DomainError>) -> Option<DomainError> {
        let mut flat = Vec::new();
        for err in errors {
            match err {
                DomainError::Joined(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(DomainError::Joined(flat)),
        }
    }

    /// Errors carried by this value; a joined error yields its members.
    pub fn errors(&self) -> Vec<&DomainError> {
        match self {
            DomainError::Joined(inner) => inner.iter().collect(),
            other => vec![other],
        }
    }

    /// Whether the failed call still changed state, for this error or any
    /// joined member.
    pub fn was_applied(&self) -> bool {
        self.errors()
            .iter()
            .any(|e| matches!(e, DomainError::NotPersisted { .. }))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DomainError::ScopeDenied { .. } => ErrorCode::ScopeDenied,
            DomainError::ScopeRequired { .. } => ErrorCode::ScopeRequired,
            DomainError::MissingRequiredFields { .. } => ErrorCode::MissingRequiredFields,
            DomainError::NotFound { .. } => ErrorCode::NotFound,
            DomainError::AgreementImmutable { .. } => ErrorCode::AgreementImmutable,
            DomainError::VersionConflict { .. } => ErrorCode::VersionConflict,
            DomainError::InvalidSignerState { .. } => ErrorCode::InvalidSignerState,
            DomainError::AuditEventsAppendOnly => ErrorCode::AuditEventsAppendOnly,
            DomainError::TokenInvalid => ErrorCode::TokenInvalid,
            DomainError::TokenExpired { .. } => ErrorCode::TokenExpired,
            DomainError::TokenRevoked { .. } => ErrorCode::TokenRevoked,
            DomainError::RateLimited { .. } => ErrorCode::RateLimited,
            DomainError::StorageEncryptionRequired { .. } => ErrorCode::StorageEncryptionRequired,
            DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            DomainError::Infrastructure { .. } | DomainError::NotPersisted { .. } => {
                ErrorCode::Infrastructure
            }
            DomainError::Joined(inner) => inner
                .first()
                .map(|e| e.code())
                .unwrap_or(ErrorCode::Infrastructure),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            ErrorCode::ScopeRequired | ErrorCode::MissingRequiredFields => {
                ErrorCategory::Validation
            }
            ErrorCode::ScopeDenied
            | ErrorCode::TokenInvalid
            | ErrorCode::TokenExpired
            | ErrorCode::TokenRevoked => ErrorCategory::Authz,
            ErrorCode::NotFound => ErrorCategory::NotFound,
            ErrorCode::AgreementImmutable
            | ErrorCode::VersionConflict
            | ErrorCode::InvalidSignerState
            | ErrorCode::AuditEventsAppendOnly
            | ErrorCode::InvalidTransition => ErrorCategory::Conflict,
            ErrorCode::RateLimited => ErrorCategory::RateLimit,
            ErrorCode::StorageEncryptionRequired => ErrorCategory::BadInput,
            ErrorCode::Infrastructure => ErrorCategory::Internal,
        }
    }

    /// Advisory HTTP status for boundaries that speak HTTP.
    pub fn http_status(&self) -> u16 {
        match self.code() {
            ErrorCode::TokenInvalid => 401,
            ErrorCode::TokenExpired | ErrorCode::TokenRevoked => 410,
            _ => match self.category() {
                ErrorCategory::Validation | ErrorCategory::BadInput => 400,
                ErrorCategory::Authz => 403,
                ErrorCategory::NotFound => 404,
                ErrorCategory::Conflict => 409,
                ErrorCategory::RateLimit => 429,
                ErrorCategory::Internal => 500,
            },
        }
    }

    pub fn metadata(&self) -> BTreeMap<String, String> {
        let pairs: Vec<(&str, String)> = match self {
            DomainError::ScopeDenied { entity, id } | DomainError::NotFound { entity, id } => {
                vec![("entity", entity.clone()), ("id", id.clone())]
            }
            DomainError::ScopeRequired { field } => vec![("field", field.clone())],
            DomainError::MissingRequiredFields {
                entity,
                field,
                reason,
            } => vec![
                ("entity", entity.clone()),
                ("field", field.clone()),
                ("reason", reason.clone()),
            ],
            DomainError::AgreementImmutable {
                agreement_id,
                status,
            } => vec![
                ("agreement_id", agreement_id.clone()),
                ("status", status.clone()),
            ],
            DomainError::VersionConflict {
                entity,
                id,
                expected,
                actual,
            } => vec![
                ("entity", entity.clone()),
                ("id", id.clone()),
                ("expected", expected.to_string()),
                ("actual", actual.to_string()),
            ],
            DomainError::InvalidSignerState { message }
            | DomainError::RateLimited { message }
            | DomainError::Infrastructure { message } => vec![("message", message.clone())],
            DomainError::NotPersisted { message } => {
                vec![("message", message.clone()), ("applied", "true".to_string())]
            }
            DomainError::TokenExpired { token_id } | DomainError::TokenRevoked { token_id } => {
                vec![("token_id", token_id.clone())]
            }
            DomainError::StorageEncryptionRequired { object_key } => {
                vec![("object_key", object_key.clone())]
            }
            DomainError::InvalidTransition {
                entity,
                id,
                from,
                to,
            } => vec![
                ("entity", entity.clone()),
                ("id", id.clone()),
                ("from", from.clone()),
                ("to", to.clone()),
            ],
            DomainError::Joined(inner) => vec![("joined", inner.len().to_string())],
            DomainError::AuditEventsAppendOnly | DomainError::TokenInvalid => Vec::new(),
        };
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Structured body for service boundaries. Internal errors keep a
    /// generic message so persistence details do not leak.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self.code() {
            ErrorCode::Infrastructure => "internal error".to_string(),
            _ => self.to_string(),
        };
        let metadata = match self.code() {
            ErrorCode::Infrastructure => BTreeMap::new(),
            _ => self.metadata(),
        };
        ErrorBody {
            code: self.code(),
            message,
            metadata,
        }
    }
}

/// User-visible error payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
}
