use chrono::{DateTime, Utc};
use esign_server_domain::jobs::{
    DeliveryStatus, EmailLog, GoogleImportRun, ImportRunFailure, ImportRunInput, ImportRunResult,
    ImportRunStart, ImportRunStatus, JobRun, JobRunFailure, JobRunInput, JobRunStart,
    JobRunStatus, MaxAttempts, NewEmailLog,
};
use esign_server_domain::{
    DomainError, ListOptions, Page, Result, Scope, mint_id, normalize_id, paginate,
    require_text, resolve_time, window,
};
use tracing::debug;

use super::state::{StoreState, ensure_free, index_key, lookup, optional_text};

impl StoreState {
    pub(crate) fn job_run(&self, scope: &Scope, id: &str) -> Result<&JobRun> {
        lookup(&self.job_runs, scope, "job_run", id)
    }

    pub(crate) fn begin_job_run(
        &mut self,
        scope: &Scope,
        input: JobRunInput,
        now: DateTime<Utc>,
    ) -> Result<JobRunStart> {
        let job_name = require_text("job_run", "job_name", &input.job_name)?;
        let dedupe_key = require_text("job_run", "dedupe_key", &input.dedupe_key)?;
        let attempted_at = resolve_time(input.attempted_at, now);
        let key = index_key(scope, &[&job_name, &dedupe_key]);

        if let Some(id) = self.job_dedupe_index.get(&key) {
            let mut run = self.job_run(scope, id)?.clone();
            let should_run = run.replay(attempted_at);
            if should_run {
                self.job_runs.insert(run.id.clone(), run.clone());
            }
            debug!(job_name = %run.job_name, dedupe_key = %run.dedupe_key, should_run, attempt = run.attempt_count, "Job run replayed");
            return Ok(JobRunStart { run, should_run });
        }

        let agreement_id = input.agreement_id.trim().to_string();
        if !agreement_id.is_empty() {
            self.agreement(scope, &agreement_id)?;
        }
        let id = mint_id();
        let run = JobRun {
            id: id.clone(),
            scope: scope.clone(),
            job_name,
            dedupe_key,
            agreement_id,
            status: JobRunStatus::Pending,
            attempt_count: 1,
            max_attempts: input.max_attempts().value(),
            next_retry_at: None,
            last_error: String::new(),
            correlation_id: input.correlation_id.trim().to_string(),
            created_at: attempted_at,
            updated_at: attempted_at,
        };
        self.job_dedupe_index.insert(key, id.clone());
        self.job_runs.insert(id, run.clone());
        Ok(JobRunStart {
            run,
            should_run: true,
        })
    }

    pub(crate) fn mark_job_run_succeeded(
        &mut self,
        scope: &Scope,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<JobRun> {
        let mut run = self.job_run(scope, id)?.clone();
        run.mark_succeeded(at)?;
        self.job_runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    pub(crate) fn mark_job_run_failed(
        &mut self,
        scope: &Scope,
        id: &str,
        failure: JobRunFailure,
    ) -> Result<JobRun> {
        let mut run = self.job_run(scope, id)?.clone();
        run.mark_failed(&failure)?;
        self.job_runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    pub(crate) fn job_run_by_dedupe(
        &self,
        scope: &Scope,
        job_name: &str,
        dedupe_key: &str,
    ) -> Result<&JobRun> {
        let job_name = job_name.trim();
        let dedupe_key = dedupe_key.trim();
        let id = self
            .job_dedupe_index
            .get(&index_key(scope, &[job_name, dedupe_key]))
            .ok_or_else(|| DomainError::not_found("job_run", format!("{}:{}", job_name, dedupe_key)))?;
        self.job_run(scope, id)
    }

    pub(crate) fn list_job_runs(
        &self,
        scope: &Scope,
        job_name: Option<&str>,
        options: &ListOptions,
    ) -> Vec<JobRun> {
        let job_name = job_name.map(str::trim).filter(|n| !n.is_empty());
        let mut runs: Vec<JobRun> = self
            .job_runs
            .values()
            .filter(|r| &r.scope == scope && job_name.is_none_or(|n| r.job_name == n))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        if options.sort_desc {
            runs.reverse();
        }
        window(runs, options)
    }

    pub(crate) fn google_import_run(&self, scope: &Scope, id: &str) -> Result<&GoogleImportRun> {
        lookup(&self.google_import_runs, scope, "google_import_run", id)
    }

    pub(crate) fn begin_google_import_run(
        &mut self,
        scope: &Scope,
        input: ImportRunInput,
        now: DateTime<Utc>,
    ) -> Result<ImportRunStart> {
        let user_id = require_text("google_import_run", "user_id", &input.user_id)?;
        let google_file_id =
            require_text("google_import_run", "google_file_id", &input.google_file_id)?;
        let dedupe_key = input.effective_dedupe_key();
        let requested_at = resolve_time(input.requested_at, now);
        let key = index_key(scope, &[&user_id, &dedupe_key]);

        if let Some(id) = self.import_dedupe_index.get(&key) {
            let mut run = self.google_import_run(scope, id)?.clone();
            let should_start = run.replay(requested_at);
            if should_start {
                self.google_import_runs
                    .insert(run.id.clone(), run.clone());
            }
            return Ok(ImportRunStart { run, should_start });
        }

        let id = mint_id();
        let run = GoogleImportRun {
            id: id.clone(),
            scope: scope.clone(),
            user_id,
            google_file_id,
            source_version: input.source_version.trim().to_string(),
            dedupe_key,
            status: ImportRunStatus::Queued,
            attempt_count: 1,
            max_attempts: MaxAttempts::new(input.max_attempts).value(),
            document_id: None,
            agreement_id: None,
            error_code: String::new(),
            last_error: String::new(),
            correlation_id: input.correlation_id.trim().to_string(),
            started_at: None,
            completed_at: None,
            created_at: requested_at,
            updated_at: requested_at,
        };
        self.import_dedupe_index.insert(key, id.clone());
        self.google_import_runs.insert(id, run.clone());
        Ok(ImportRunStart {
            run,
            should_start: true,
        })
    }

    pub(crate) fn mark_google_import_running(
        &mut self,
        scope: &Scope,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<GoogleImportRun> {
        let mut run = self.google_import_run(scope, id)?.clone();
        run.mark_running(at)?;
        self.google_import_runs
            .insert(run.id.clone(), run.clone());
        Ok(run)
    }

    pub(crate) fn mark_google_import_succeeded(
        &mut self,
        scope: &Scope,
        id: &str,
        result: ImportRunResult,
    ) -> Result<GoogleImportRun> {
        let mut run = self.google_import_run(scope, id)?.clone();
        let document_id = require_text("google_import_run", "document_id", &result.document_id)?;
        self.document(scope, &document_id)?;
        let agreement_id = optional_text(result.agreement_id);
        if let Some(agreement_id) = &agreement_id {
            self.agreement(scope, agreement_id)?;
        }
        run.mark_succeeded(&ImportRunResult {
            document_id,
            agreement_id,
            at: result.at,
        })?;
        self.google_import_runs
            .insert(run.id.clone(), run.clone());
        Ok(run)
    }

    pub(crate) fn mark_google_import_failed(
        &mut self,
        scope: &Scope,
        id: &str,
        failure: ImportRunFailure,
    ) -> Result<GoogleImportRun> {
        let mut run = self.google_import_run(scope, id)?.clone();
        run.mark_failed(&failure)?;
        self.google_import_runs
            .insert(run.id.clone(), run.clone());
        Ok(run)
    }

    pub(crate) fn list_google_import_runs(
        &self,
        scope: &Scope,
        user_id: Option<&str>,
        options: &ListOptions,
    ) -> Result<Page<GoogleImportRun>> {
        let user_id = user_id.map(str::trim).filter(|u| !u.is_empty());
        paginate(
            self.google_import_runs
                .values()
                .filter(|r| &r.scope == scope && user_id.is_none_or(|u| r.user_id == u)),
            options,
        )
    }

    pub(crate) fn create_email_log(
        &mut self,
        scope: &Scope,
        input: NewEmailLog,
        now: DateTime<Utc>,
    ) -> Result<EmailLog> {
        let agreement_id = self.agreement(scope, &input.agreement_id)?.id.clone();
        let recipient_id = optional_text(input.recipient_id);
        if let Some(recipient_id) = &recipient_id {
            self.recipient(scope, &agreement_id, recipient_id)?;
        }
        let template_code = require_text("email_log", "template_code", &input.template_code)?;

        let id = normalize_id(input.id.as_deref());
        ensure_free(&self.email_logs, scope, "email_log", &id)?;
        let created_at = resolve_time(input.created_at, now);
        let log = EmailLog {
            id: id.clone(),
            scope: scope.clone(),
            agreement_id,
            recipient_id,
            template_code,
            provider_message_id: String::new(),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            max_attempts: MaxAttempts::new(input.max_attempts).value(),
            next_retry_at: None,
            last_error: String::new(),
            correlation_id: input.correlation_id.trim().to_string(),
            sent_at: None,
            created_at,
            updated_at: created_at,
        };
        self.email_logs.insert(id, log.clone());
        Ok(log)
    }

    pub(crate) fn mark_email_log_sent(
        &mut self,
        scope: &Scope,
        id: &str,
        provider_message_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EmailLog> {
        let mut log = lookup(&self.email_logs, scope, "email_log", id)?.clone();
        log.mark_sent(provider_message_id, at)?;
        self.email_logs.insert(log.id.clone(), log.clone());
        Ok(log)
    }

    pub(crate) fn mark_email_log_failed(
        &mut self,
        scope: &Scope,
        id: &str,
        reason: &str,
        next_retry_at: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<EmailLog> {
        let mut log = lookup(&self.email_logs, scope, "email_log", id)?.clone();
        log.mark_failed(reason, next_retry_at, at)?;
        self.email_logs.insert(log.id.clone(), log.clone());
        Ok(log)
    }

    pub(crate) fn list_email_logs(&self, scope: &Scope, agreement_id: &str) -> Result<Vec<EmailLog>> {
        let agreement = self.agreement(scope, agreement_id)?;
        let mut logs: Vec<EmailLog> = self
            .email_logs
            .values()
            .filter(|l| l.agreement_id == agreement.id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(logs)
    }
}
