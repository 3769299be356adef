use chrono::{DateTime, Utc};
use esign_server_domain::jobs::MaxAttempts;
use esign_server_domain::outbox::{
    ClaimRequest, NewOutboxMessage, OutboxMessage, OutboxQuery, OutboxStats, OutboxStatus,
};
use esign_server_domain::{
    ListOptions, Result, Scope, normalize_id, require_text, resolve_time, window,
};
use tracing::debug;

use super::state::{StoreState, ensure_free, lookup};

impl StoreState {
    pub(crate) fn enqueue_outbox(
        &mut self,
        scope: &Scope,
        message: NewOutboxMessage,
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage> {
        let topic = require_text("outbox_message", "topic", &message.topic)?;
        let id = normalize_id(message.id.as_deref());
        ensure_free(&self.outbox_messages, scope, "outbox_message", &id)?;
        let message_key = match message.message_key.trim() {
            "" => id.clone(),
            key => key.to_string(),
        };
        let payload = match message.payload {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            payload => payload,
        };
        let created_at = resolve_time(message.created_at, now);
        let stored = OutboxMessage {
            id: id.clone(),
            scope: scope.clone(),
            topic,
            message_key,
            payload,
            headers: message.headers,
            correlation_id: message.correlation_id.trim().to_string(),
            status: OutboxStatus::Pending,
            attempt_count: 0,
            max_attempts: MaxAttempts::new(message.max_attempts).value(),
            last_error: String::new(),
            available_at: resolve_time(message.available_at, now),
            locked_at: None,
            locked_by: String::new(),
            published_at: None,
            created_at,
            updated_at: created_at,
        };
        self.outbox_messages.insert(id, stored.clone());
        Ok(stored)
    }

    /// Rows are visited in id order; ids are time-ordered so this is also
    /// enqueue order.
    pub(crate) fn claim_outbox(
        &mut self,
        scope: &Scope,
        request: ClaimRequest,
    ) -> Result<Vec<OutboxMessage>> {
        let consumer = require_text("outbox_message", "consumer", &request.consumer)?;
        let topic = request
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let mut claimed = Vec::new();
        for message in self.outbox_messages.values_mut().filter(|m| {
            &m.scope == scope
                && topic.is_none_or(|t| m.topic == t)
                && m.is_due(request.now)
        }) {
            if claimed.len() >= request.limit {
                break;
            }
            message.claim(&consumer, request.now);
            claimed.push(message.clone());
        }
        if !claimed.is_empty() {
            debug!(consumer = %consumer, count = claimed.len(), "Claimed outbox messages");
        }
        Ok(claimed)
    }

    pub(crate) fn mark_outbox_succeeded(
        &mut self,
        scope: &Scope,
        id: &str,
        consumer: &str,
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage> {
        let mut message = lookup(&self.outbox_messages, scope, "outbox_message", id)?.clone();
        message.mark_succeeded(consumer, now)?;
        self.outbox_messages
            .insert(message.id.clone(), message.clone());
        Ok(message)
    }

    pub(crate) fn mark_outbox_failed(
        &mut self,
        scope: &Scope,
        id: &str,
        consumer: &str,
        reason: &str,
        next_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<OutboxMessage> {
        let mut message = lookup(&self.outbox_messages, scope, "outbox_message", id)?.clone();
        message.mark_failed(consumer, reason, next_attempt_at, now)?;
        self.outbox_messages
            .insert(message.id.clone(), message.clone());
        Ok(message)
    }

    pub(crate) fn list_outbox(&self, scope: &Scope, query: &OutboxQuery) -> Vec<OutboxMessage> {
        let topic = query.topic.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let messages: Vec<OutboxMessage> = self
            .outbox_messages
            .values()
            .filter(|m| {
                &m.scope == scope
                    && topic.is_none_or(|t| m.topic == t)
                    && query.status.is_none_or(|s| m.status == s)
            })
            .cloned()
            .collect();
        window(
            messages,
            &ListOptions {
                limit: query.limit,
                offset: query.offset,
                ..ListOptions::default()
            },
        )
    }

    pub(crate) fn release_stale_outbox_claims(
        &mut self,
        scope: &Scope,
        locked_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut released = 0;
        for message in self.outbox_messages.values_mut().filter(|m| {
            &m.scope == scope
                && m.status == OutboxStatus::Processing
                && m.locked_at.is_some_and(|at| at < locked_before)
        }) {
            message.release(now);
            released += 1;
        }
        released
    }

    pub(crate) fn outbox_stats(&self, scope: &Scope) -> OutboxStats {
        let mut stats = OutboxStats::default();
        for message in self.outbox_messages.values().filter(|m| &m.scope == scope) {
            match message.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Processing => stats.processing += 1,
                OutboxStatus::Retrying => stats.retrying += 1,
                OutboxStatus::Succeeded => stats.succeeded += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub(crate) fn purge_succeeded_outbox(
        &mut self,
        scope: &Scope,
        published_before: DateTime<Utc>,
    ) -> usize {
        let before = self.outbox_messages.len();
        self.outbox_messages.retain(|_, m| {
            !(&m.scope == scope
                && m.status == OutboxStatus::Succeeded
                && m.published_at.is_some_and(|at| at < published_before))
        });
        before - self.outbox_messages.len()
    }
}
