use std::collections::BTreeSet;

use crate::shared_kernel::{DomainError, Result, Scope};

/// Admission rules for object writes: tenant-prefixed keys under a
/// documents or agreements segment, with server-side encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageSecurityPolicy {
    pub require_encryption: bool,
    /// Lowercase algorithm names; empty admits any non-empty algorithm.
    pub allowed_algorithms: BTreeSet<String>,
}

impl Default for ObjectStorageSecurityPolicy {
    fn default() -> Self {
        Self {
            require_encryption: true,
            allowed_algorithms: ["aes256", "aws:kms", "kms"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ObjectStorageSecurityPolicy {
    pub fn validate_object_write(&self, object_key: &str, algorithm: &str) -> Result<()> {
        let key = object_key.trim();
        if !key.starts_with("tenant/") || !(key.contains("/docs/") || key.contains("/agreements/"))
        {
            return Err(DomainError::missing(
                "object",
                "object_key",
                "must start with tenant/ and contain /docs/ or /agreements/",
            ));
        }

        if !self.require_encryption {
            return Ok(());
        }

        let algorithm = algorithm.trim().to_ascii_lowercase();
        if algorithm.is_empty()
            || (!self.allowed_algorithms.is_empty() && !self.allowed_algorithms.contains(&algorithm))
        {
            return Err(DomainError::StorageEncryptionRequired {
                object_key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Shape and encryption checks, plus the key's tenant segment must name
    /// the caller's tenant. A key under another tenant is `SCOPE_DENIED`.
    pub fn validate_scoped_object_write(
        &self,
        scope: &Scope,
        object_key: &str,
        algorithm: &str,
    ) -> Result<()> {
        self.validate_object_write(object_key, algorithm)?;
        let key = object_key.trim();
        let owner = key
            .strip_prefix("tenant/")
            .and_then(|rest| rest.split('/').next())
            .unwrap_or_default();
        if owner != scope.tenant_id.trim() {
            return Err(DomainError::ScopeDenied {
                entity: "object".to_string(),
                id: key.to_string(),
            });
        }
        Ok(())
    }
}
