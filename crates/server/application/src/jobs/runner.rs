//! Job Runner
//!
//! Wraps a unit of work in the job-run lifecycle: begin (deduplicated on
//! `(scope, job_name, dedupe_key)`), skip when the store says not to run,
//! otherwise run and settle. Failures are rescheduled with exponential
//! backoff until the attempt budget is spent.

use chrono::{Duration, Utc};
use esign_server_domain::jobs::{JobRun, JobRunFailure, JobRunInput, JobRunRepository};
use esign_server_domain::{Result, Scope};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exponential backoff: `base * 2^(attempt - 1)`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::seconds(30),
            cap: Duration::hours(1),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: i32) -> Duration {
        let exponent = (attempt.max(1) - 1).min(30) as u32;
        let seconds = self
            .base
            .num_seconds()
            .saturating_mul(1i64 << exponent)
            .min(self.cap.num_seconds());
        Duration::seconds(seconds)
    }
}

/// What happened to one `run` call
#[derive(Debug)]
pub enum JobOutcome<T> {
    /// The store declined the run: already succeeded, exhausted, or inside
    /// its retry window.
    Skipped(JobRun),
    Succeeded { run: JobRun, output: T },
    /// The work failed; `run` is `retrying` or `failed`.
    Failed { run: JobRun, error: String },
}

impl<T> JobOutcome<T> {
    pub fn run(&self) -> &JobRun {
        match self {
            JobOutcome::Skipped(run) => run,
            JobOutcome::Succeeded { run, .. } | JobOutcome::Failed { run, .. } => run,
        }
    }

    pub fn was_executed(&self) -> bool {
        !matches!(self, JobOutcome::Skipped(_))
    }
}

pub struct JobRunner<S: ?Sized> {
    store: Arc<S>,
    backoff: BackoffPolicy,
}

impl<S: JobRunRepository + ?Sized> JobRunner<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Store errors are returned as `Err`; errors from `work` are recorded
    /// on the run and reported as [`JobOutcome::Failed`].
    pub async fn run<T, E, F, Fut>(
        &self,
        scope: &Scope,
        input: JobRunInput,
        work: F,
    ) -> Result<JobOutcome<T>>
    where
        F: FnOnce(JobRun) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let start = self.store.begin_job_run(scope, input).await?;
        if !start.should_run {
            debug!(
                job_name = %start.run.job_name,
                dedupe_key = %start.run.dedupe_key,
                status = %start.run.status,
                "Job run skipped"
            );
            return Ok(JobOutcome::Skipped(start.run));
        }

        let run_id = start.run.id.clone();
        let attempt = start.run.attempt_count;
        match work(start.run).await {
            Ok(output) => {
                let run = self
                    .store
                    .mark_job_run_succeeded(scope, &run_id, Utc::now())
                    .await?;
                info!(job_name = %run.job_name, attempt, "Job run succeeded");
                Ok(JobOutcome::Succeeded { run, output })
            }
            Err(err) => {
                let error = err.to_string();
                let failed_at = Utc::now();
                let run = self
                    .store
                    .mark_job_run_failed(
                        scope,
                        &run_id,
                        JobRunFailure {
                            reason: error.clone(),
                            next_retry_at: Some(failed_at + self.backoff.delay_for(attempt)),
                            failed_at,
                        },
                    )
                    .await?;
                warn!(
                    job_name = %run.job_name,
                    attempt,
                    status = %run.status,
                    error = %error,
                    "Job run failed"
                );
                Ok(JobOutcome::Failed { run, error })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esign_server_domain::jobs::JobRunStatus;
    use esign_server_infrastructure::InMemoryStore;
    use rstest::rstest;

    fn scope() -> Scope {
        Scope::new("tenant-1", "org-1")
    }

    fn input(max_attempts: i32) -> JobRunInput {
        JobRunInput {
            job_name: "render_pdf".to_string(),
            dedupe_key: "agreement-7:v3".to_string(),
            max_attempts,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(0, 30)]
    #[case(1, 30)]
    #[case(2, 60)]
    #[case(3, 120)]
    #[case(7, 1_920)]
    #[case(8, 3_600)]
    #[case(i32::MAX, 3_600)]
    fn test_backoff_doubles_until_cap(#[case] attempt: i32, #[case] seconds: i64) {
        assert_eq!(
            BackoffPolicy::default().delay_for(attempt),
            Duration::seconds(seconds)
        );
    }

    #[tokio::test]
    async fn test_success_is_deduplicated() {
        let runner = JobRunner::new(Arc::new(InMemoryStore::new()));

        let first = runner
            .run(&scope(), input(3), |_| async { Ok::<_, String>("rendered") })
            .await
            .unwrap();
        assert!(matches!(first, JobOutcome::Succeeded { output: "rendered", .. }));
        assert_eq!(first.run().status, JobRunStatus::Succeeded);

        let replay = runner
            .run(&scope(), input(3), |_| async {
                Err::<&str, _>("must not run")
            })
            .await
            .unwrap();
        assert!(!replay.was_executed());
        assert_eq!(replay.run().attempt_count, 1);
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff_then_exhausts() {
        let store = Arc::new(InMemoryStore::new());
        let runner = JobRunner::new(store.clone());

        let failed = runner
            .run(&scope(), input(2), |_| async { Err::<(), _>("renderer crashed") })
            .await
            .unwrap();
        let run = failed.run().clone();
        assert_eq!(run.status, JobRunStatus::Retrying);
        assert_eq!(run.last_error, "renderer crashed");
        assert_eq!(
            run.next_retry_at,
            Some(run.updated_at + Duration::seconds(30))
        );

        // Still inside the retry window.
        let early = runner
            .run(&scope(), input(2), |_| async { Ok::<_, String>(()) })
            .await
            .unwrap();
        assert!(!early.was_executed());

        let late = JobRunInput {
            attempted_at: Some(run.updated_at + Duration::seconds(31)),
            ..input(2)
        };
        let second = runner
            .run(&scope(), late, |run| async move {
                assert_eq!(run.attempt_count, 2);
                Err::<(), _>("renderer crashed again")
            })
            .await
            .unwrap();
        assert_eq!(second.run().status, JobRunStatus::Failed);
        assert!(second.run().next_retry_at.is_none());

        let exhausted = runner
            .run(&scope(), input(2), |_| async { Ok::<_, String>(()) })
            .await
            .unwrap();
        assert!(!exhausted.was_executed());
    }
}
