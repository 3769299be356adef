use chrono::{DateTime, Utc};
use esign_server_domain::audit::{AuditEvent, NewAuditEvent};
use esign_server_domain::{ListOptions, Result, Scope, normalize_id, require_text, resolve_time, window};

use super::state::{StoreState, ensure_free};

impl StoreState {
    pub(crate) fn append_audit_event(
        &mut self,
        scope: &Scope,
        input: NewAuditEvent,
        now: DateTime<Utc>,
    ) -> Result<AuditEvent> {
        let input = input.minimized();
        let agreement_id = self.agreement(scope, &input.agreement_id)?.id.clone();
        let event_type = require_text("audit_event", "event_type", &input.event_type)?;
        let actor_type = require_text("audit_event", "actor_type", &input.actor_type)?;

        let id = normalize_id(input.id.as_deref());
        ensure_free(&self.audit_events, scope, "audit_event", &id)?;
        let event = AuditEvent {
            id: id.clone(),
            scope: scope.clone(),
            agreement_id,
            event_type,
            actor_type,
            actor_id: input.actor_id.trim().to_string(),
            ip_address: input.ip_address,
            user_agent: input.user_agent,
            metadata: input.metadata,
            created_at: resolve_time(input.created_at, now),
        };
        self.audit_events.insert(id, event.clone());
        Ok(event)
    }

    pub(crate) fn list_audit_events(
        &self,
        scope: &Scope,
        agreement_id: &str,
        options: &ListOptions,
    ) -> Result<Vec<AuditEvent>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let mut events: Vec<AuditEvent> = self
            .audit_events
            .values()
            .filter(|e| e.agreement_id == agreement.id)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if options.sort_desc {
            events.reverse();
        }
        Ok(window(events, options))
    }
}
