//! Write-boundary policies: retention and privacy minimization, and object
//! storage admission.

pub mod retention;
pub mod storage;

pub use retention::{LifecycleCheck, RetentionPolicy, minimize_audit_metadata};
pub use storage::ObjectStorageSecurityPolicy;
