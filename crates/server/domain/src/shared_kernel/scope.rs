use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DomainError, Result};

/// Tenant isolation boundary: every record belongs to exactly one
/// `(tenant_id, org_id)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub tenant_id: String,
    pub org_id: String,
}

impl Scope {
    pub fn new(tenant_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            org_id: org_id.into(),
        }
    }

    /// Returns the trimmed scope, or `SCOPE_REQUIRED` when either half is blank.
    pub fn validate(&self) -> Result<Scope> {
        let tenant_id = self.tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(DomainError::ScopeRequired {
                field: "tenant_id".to_string(),
            });
        }
        let org_id = self.org_id.trim();
        if org_id.is_empty() {
            return Err(DomainError::ScopeRequired {
                field: "org_id".to_string(),
            });
        }
        Ok(Scope::new(tenant_id, org_id))
    }

    /// `SCOPE_DENIED` unless `owner` is this scope.
    pub fn ensure_owns(&self, owner: &Scope, entity: &str, id: &str) -> Result<()> {
        if self == owner {
            Ok(())
        } else {
            Err(DomainError::ScopeDenied {
                entity: entity.to_string(),
                id: id.to_string(),
            })
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.org_id)
    }
}

/// Records that carry a scope.
pub trait Scoped {
    fn scope(&self) -> &Scope;
}
