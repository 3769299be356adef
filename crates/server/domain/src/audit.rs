//! Append-only audit trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::policy::minimize_audit_metadata;
use crate::shared_kernel::{ListOptions, Result, Scope, Scoped};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub scope: Scope,
    pub agreement_id: String,
    pub event_type: String,
    pub actor_type: String,
    pub actor_id: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Scoped for AuditEvent {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditEvent {
    pub id: Option<String>,
    pub agreement_id: String,
    pub event_type: String,
    pub actor_type: String,
    pub actor_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub metadata: Map<String, Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AuditEvent {
    /// Whether the event holds network identifiers subject to the PII
    /// retention window.
    pub fn carries_pii(&self) -> bool {
        !self.ip_address.is_empty() || !self.user_agent.is_empty()
    }
}

impl NewAuditEvent {
    /// Privacy-minimized copy. The `ip_address` and `user_agent` columns go
    /// through the same masking as the metadata map; either source may carry
    /// them and the column wins. Only allow-listed metadata keys survive.
    pub fn minimized(mut self) -> Self {
        let mut meta = std::mem::take(&mut self.metadata);
        for (key, column) in [
            ("ip_address", &self.ip_address),
            ("user_agent", &self.user_agent),
        ] {
            if !column.trim().is_empty() {
                meta.insert(key.to_string(), Value::String(column.clone()));
            }
        }

        let mut out = minimize_audit_metadata(&meta);
        self.ip_address = take_text(&mut out, "ip_address");
        self.user_agent = take_text(&mut out, "user_agent");
        self.metadata = out;
        self
    }
}

fn take_text(meta: &mut Map<String, Value>, key: &str) -> String {
    match meta.remove(key) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    }
}

/// Audit events support `append` and `list` only. The update and delete
/// methods exist so callers get a coded `AUDIT_EVENTS_APPEND_ONLY` error
/// instead of a missing operation.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append_audit_event(&self, scope: &Scope, input: NewAuditEvent) -> Result<AuditEvent>;

    /// Ordered by `created_at`, then id.
    async fn list_audit_events(
        &self,
        scope: &Scope,
        agreement_id: &str,
        options: ListOptions,
    ) -> Result<Vec<AuditEvent>>;

    async fn update_audit_event(&self, scope: &Scope, event: AuditEvent) -> Result<AuditEvent>;

    async fn delete_audit_event(&self, scope: &Scope, id: &str) -> Result<()>;
}
