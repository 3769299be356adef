//! Retention sweep
//!
//! Walks one scope, applies [`RetentionPolicy`] to what the store holds and
//! purges the rows the store surface can delete: succeeded outbox messages
//! older than the log window. Artifacts, execution logs and PII-bearing
//! audit events are only counted; audit events are never deleted, and the
//! artifact objects live in object storage.

use chrono::{DateTime, Utc};
use esign_server_domain::agreements::AgreementFilter;
use esign_server_domain::policy::{LifecycleCheck, RetentionPolicy};
use esign_server_domain::{DomainError, EsignStore, ListOptions, MAX_PAGE_LIMIT, Result, Scope};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub check: LifecycleCheck,
    pub outbox_purged: usize,
}

/// Timestamps collected for one sweep
#[derive(Debug, Default)]
struct Ages {
    artifacts: Vec<DateTime<Utc>>,
    logs: Vec<DateTime<Utc>>,
    pii: Vec<DateTime<Utc>>,
}

pub struct RetentionSweep<S: ?Sized> {
    store: Arc<S>,
    policy: RetentionPolicy,
}

impl<S: ?Sized> std::fmt::Debug for RetentionSweep<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionSweep")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S> RetentionSweep<S>
where
    S: EsignStore + ?Sized,
{
    pub fn new(store: Arc<S>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn run(&self, scope: &Scope, now: DateTime<Utc>) -> Result<SweepReport> {
        let ages = self.collect(scope).await?;
        let check = self
            .policy
            .evaluate_lifecycle_check(now, &ages.artifacts, &ages.logs, &ages.pii);
        let outbox_purged = self
            .store
            .purge_succeeded_outbox(scope, now - self.policy.log_ttl)
            .await?;

        info!(
            scope = %scope,
            artifacts = check.artifacts_to_purge,
            logs = check.logs_to_purge,
            pii = check.pii_to_purge,
            outbox_purged,
            "Retention sweep finished"
        );
        Ok(SweepReport {
            check,
            outbox_purged,
        })
    }

    async fn collect(&self, scope: &Scope) -> Result<Ages> {
        let mut ages = Ages::default();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .list_agreements(
                    scope,
                    AgreementFilter::default(),
                    ListOptions::with_limit(MAX_PAGE_LIMIT).cursor(cursor.take()),
                )
                .await?;
            for agreement in &page.items {
                self.collect_agreement(scope, &agreement.id, &mut ages)
                    .await?;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut offset = 0;
        loop {
            let runs = self
                .store
                .list_job_runs(scope, None, window(offset))
                .await?;
            ages.logs.extend(runs.iter().map(|r| r.created_at));
            if runs.len() < MAX_PAGE_LIMIT {
                break;
            }
            offset += runs.len();
        }

        debug!(
            artifacts = ages.artifacts.len(),
            logs = ages.logs.len(),
            pii = ages.pii.len(),
            "Collected retention candidates"
        );
        Ok(ages)
    }

    async fn collect_agreement(
        &self,
        scope: &Scope,
        agreement_id: &str,
        ages: &mut Ages,
    ) -> Result<()> {
        match self.store.get_agreement_artifacts(scope, agreement_id).await {
            Ok(artifact) => ages.artifacts.push(artifact.created_at),
            Err(DomainError::NotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let logs = self.store.list_email_logs(scope, agreement_id).await?;
        ages.logs.extend(logs.iter().map(|l| l.created_at));

        let mut offset = 0;
        loop {
            let events = self
                .store
                .list_audit_events(scope, agreement_id, window(offset))
                .await?;
            ages.pii.extend(
                events
                    .iter()
                    .filter(|e| e.carries_pii())
                    .map(|e| e.created_at),
            );
            if events.len() < MAX_PAGE_LIMIT {
                return Ok(());
            }
            offset += events.len();
        }
    }
}

fn window(offset: usize) -> ListOptions {
    ListOptions {
        limit: MAX_PAGE_LIMIT,
        offset,
        ..ListOptions::default()
    }
}
