use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::attempts::{
    AttemptPhase, FailureSettlement, MaxAttempts, replay_allowed, settle_failure,
};
use crate::shared_kernel::{DomainError, ListOptions, Result, Scope, Scoped};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    #[default]
    Pending,
    Retrying,
    Succeeded,
    Failed,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Pending => "pending",
            JobRunStatus::Retrying => "retrying",
            JobRunStatus::Succeeded => "succeeded",
            JobRunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub scope: Scope,
    pub job_name: String,
    pub dedupe_key: String,
    #[serde(default)]
    pub agreement_id: String,
    pub status: JobRunStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: String,
    #[serde(default)]
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scoped for JobRun {
    fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl JobRun {
    pub fn phase(&self) -> AttemptPhase {
        match self.status {
            JobRunStatus::Pending => AttemptPhase::InFlight,
            JobRunStatus::Retrying => AttemptPhase::Retrying {
                next_retry_at: self.next_retry_at,
            },
            JobRunStatus::Succeeded => AttemptPhase::Succeeded,
            JobRunStatus::Failed => AttemptPhase::Failed,
        }
    }

    /// Apply the replay rule for a repeated `begin`. Returns `should_run`;
    /// when true the record has been reset for a new attempt.
    pub fn replay(&mut self, now: DateTime<Utc>) -> bool {
        if !replay_allowed(self.phase(), self.attempt_count, self.max_attempts, now) {
            return false;
        }
        self.attempt_count += 1;
        self.status = JobRunStatus::Pending;
        self.last_error.clear();
        self.next_retry_at = None;
        self.updated_at = now;
        true
    }

    pub fn mark_succeeded(&mut self, at: DateTime<Utc>) -> Result<()> {
        match self.status {
            JobRunStatus::Succeeded => Ok(()),
            JobRunStatus::Pending | JobRunStatus::Retrying => {
                self.status = JobRunStatus::Succeeded;
                self.last_error.clear();
                self.next_retry_at = None;
                self.updated_at = at;
                Ok(())
            }
            JobRunStatus::Failed => Err(self.invalid_transition(JobRunStatus::Succeeded)),
        }
    }

    pub fn mark_failed(&mut self, failure: &JobRunFailure) -> Result<()> {
        if matches!(self.status, JobRunStatus::Succeeded | JobRunStatus::Failed) {
            return Err(self.invalid_transition(JobRunStatus::Failed));
        }
        self.last_error = failure.reason.clone();
        self.updated_at = failure.failed_at;
        match settle_failure(self.attempt_count, self.max_attempts, failure.next_retry_at) {
            FailureSettlement::Terminal => {
                self.status = JobRunStatus::Failed;
                self.next_retry_at = None;
            }
            FailureSettlement::Retry { at } => {
                self.status = JobRunStatus::Retrying;
                self.next_retry_at = Some(at);
            }
        }
        Ok(())
    }

    fn invalid_transition(&self, to: JobRunStatus) -> DomainError {
        DomainError::InvalidTransition {
            entity: "job_run".to_string(),
            id: self.id.clone(),
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobRunInput {
    pub job_name: String,
    pub dedupe_key: String,
    pub agreement_id: String,
    /// Non-positive selects the default budget.
    pub max_attempts: i32,
    pub correlation_id: String,
    /// Clock used for the retry-window gate.
    pub attempted_at: Option<DateTime<Utc>>,
}

impl JobRunInput {
    pub fn max_attempts(&self) -> MaxAttempts {
        MaxAttempts::new(self.max_attempts)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRunStart {
    pub run: JobRun,
    pub should_run: bool,
}

#[derive(Debug, Clone)]
pub struct JobRunFailure {
    pub reason: String,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failed_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobRunRepository: Send + Sync {
    /// Keyed by `(scope, job_name, dedupe_key)`.
    async fn begin_job_run(&self, scope: &Scope, input: JobRunInput) -> Result<JobRunStart>;

    async fn mark_job_run_succeeded(
        &self,
        scope: &Scope,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<JobRun>;

    async fn mark_job_run_failed(
        &self,
        scope: &Scope,
        id: &str,
        failure: JobRunFailure,
    ) -> Result<JobRun>;

    async fn get_job_run(&self, scope: &Scope, id: &str) -> Result<JobRun>;

    async fn get_job_run_by_dedupe(
        &self,
        scope: &Scope,
        job_name: &str,
        dedupe_key: &str,
    ) -> Result<JobRun>;

    /// Ordered by `created_at`, then id.
    async fn list_job_runs(
        &self,
        scope: &Scope,
        job_name: Option<&str>,
        options: ListOptions,
    ) -> Result<Vec<JobRun>>;
}
