use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::attempts::{AttemptPhase, replay_allowed};
use crate::shared_kernel::{DomainError, ListOptions, Page, Paginated, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportRunStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ImportRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportRunStatus::Queued => "queued",
            ImportRunStatus::Running => "running",
            ImportRunStatus::Succeeded => "succeeded",
            ImportRunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImportRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to import a Google Drive file as a document (and optionally
/// a draft agreement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleImportRun {
    pub id: String,
    pub scope: Scope,
    pub user_id: String,
    pub google_file_id: String,
    #[serde(default)]
    pub source_version: String,
    pub dedupe_key: String,
    pub status: ImportRunStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub document_id: Option<String>,
    pub agreement_id: Option<String>,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub correlation_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for GoogleImportRun {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Paginated for GoogleImportRun {
    fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

impl GoogleImportRun {
    /// Queued and running imports are in flight: a duplicate request joins
    /// them instead of starting another import.
    fn phase(&self) -> AttemptPhase {
        match self.status {
            ImportRunStatus::Succeeded => AttemptPhase::Succeeded,
            ImportRunStatus::Failed => AttemptPhase::Failed,
            ImportRunStatus::Queued | ImportRunStatus::Running => AttemptPhase::InFlight,
        }
    }

    /// Requeue a failed run with budget left. Returns whether it was requeued.
    pub fn replay(&mut self, now: DateTime<Utc>) -> bool {
        if self.phase() == AttemptPhase::InFlight
            || !replay_allowed(self.phase(), self.attempt_count, self.max_attempts, now)
        {
            return false;
        }
        self.attempt_count += 1;
        self.status = ImportRunStatus::Queued;
        self.error_code.clear();
        self.last_error.clear();
        self.started_at = None;
        self.completed_at = None;
        self.updated_at = now;
        true
    }

    pub fn mark_running(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != ImportRunStatus::Queued {
            return Err(self.invalid_transition(ImportRunStatus::Running));
        }
        self.status = ImportRunStatus::Running;
        self.started_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn mark_succeeded(&mut self, result: &ImportRunResult) -> Result<()> {
        if !matches!(
            self.status,
            ImportRunStatus::Queued | ImportRunStatus::Running
        ) {
            return Err(self.invalid_transition(ImportRunStatus::Succeeded));
        }
        self.status = ImportRunStatus::Succeeded;
        self.document_id = Some(result.document_id.clone());
        self.agreement_id = result.agreement_id.clone();
        self.completed_at = Some(result.at);
        self.updated_at = result.at;
        Ok(())
    }

    pub fn mark_failed(&mut self, failure: &ImportRunFailure) -> Result<()> {
        if !matches!(
            self.status,
            ImportRunStatus::Queued | ImportRunStatus::Running
        ) {
            return Err(self.invalid_transition(ImportRunStatus::Failed));
        }
        self.status = ImportRunStatus::Failed;
        self.error_code = failure.error_code.clone();
        self.last_error = failure.error_message.clone();
        self.completed_at = Some(failure.at);
        self.updated_at = failure.at;
        Ok(())
    }

    fn invalid_transition(&self, to: ImportRunStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "google_import_run".to_string(),
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportRunInput {
    pub user_id: String,
    pub google_file_id: String,
    pub source_version: String,
    /// Defaults to `google_file_id:source_version` when blank.
    pub dedupe_key: String,
    pub max_attempts: i32,
    pub correlation_id: String,
    pub requested_at: Option<DateTime<Utc>>,
}

impl ImportRunInput {
    pub fn effective_dedupe_key(&self) -> String {
        let key = self.dedupe_key.trim();
        if key.is_empty() {
            format!(
                "{}:{}",
                self.google_file_id.trim(),
                self.source_version.trim()
            )
        } else {
            key.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRunStart {
    pub run: GoogleImportRun,
    pub should_start: bool,
}

#[derive(Debug, Clone)]
pub struct ImportRunResult {
    pub document_id: String,
    pub agreement_id: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ImportRunFailure {
    pub error_code: String,
    pub error_message: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait GoogleImportRunRepository: Send + Sync {
    /// Keyed by `(scope, user_id, dedupe_key)`.
    async fn begin_google_import_run(
        &self,
        scope: &Scope,
        input: ImportRunInput,
    ) -> Result<ImportRunStart>;

    async fn mark_google_import_running(
        &self,
        scope: &Scope,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<GoogleImportRun>;

    async fn mark_google_import_succeeded(
        &self,
        scope: &Scope,
        id: &str,
        result: ImportRunResult,
    ) -> Result<GoogleImportRun>;

    async fn mark_google_import_failed(
        &self,
        scope: &Scope,
        id: &str,
        failure: ImportRunFailure,
    ) -> Result<GoogleImportRun>;

    async fn get_google_import_run(&self, scope: &Scope, id: &str) -> Result<GoogleImportRun>;

    /// Cursor-paginated by `created_at`, then id.
    async fn list_google_import_runs(
        &self,
        scope: &Scope,
        user_id: Option<&str>,
        options: ListOptions,
    ) -> Result<Page<GoogleImportRun>>;
}
