//! Pipeline engine: runs one job through competitors → keywords → drafts.
//!
//! Each stage calls its capability adapter under the [`RetryPolicy`], checks
//! the output contract, and persists the result before the next stage starts.
//! Exhausting a stage's retries fails the job; results of earlier stages stay
//! readable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use seocompass_adapters::{Capabilities, contract};
use seocompass_shared::{
    JobId, JobStatus, Keyword, Result, SeoCompassError, Stage, StagePayload, parse_target_url,
};
use seocompass_storage::Storage;

use crate::retry::RetryPolicy;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts its first attempt.
    fn stage_started(&self, job_id: &JobId, stage: Stage);
    /// Called after a failed attempt, before sleeping `delay`.
    fn retrying(&self, job_id: &JobId, stage: Stage, attempt: u32, delay: Duration, error: &str);
    /// Called once a stage's result is persisted.
    fn stage_completed(&self, job_id: &JobId, stage: Stage, items: usize);
    /// Called when the job reaches a terminal status.
    fn finished(&self, outcome: &JobOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _job_id: &JobId, _stage: Stage) {}
    fn retrying(&self, _: &JobId, _: Stage, _: u32, _: Duration, _: &str) {}
    fn stage_completed(&self, _job_id: &JobId, _stage: Stage, _items: usize) {}
    fn finished(&self, _outcome: &JobOutcome) {}
}

/// Terminal state of one engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: JobId,
    /// COMPLETED or FAILED.
    pub status: JobStatus,
    pub error: Option<String>,
    /// Stages whose results were persisted, in order.
    pub stages_completed: Vec<Stage>,
    pub elapsed: Duration,
}

/// Result of driving one stage.
enum StageRun {
    Done(StagePayload),
    Exhausted(String),
}

/// Runs analysis jobs against a store with a fixed adapter set.
pub struct Pipeline {
    store: Arc<Storage>,
    caps: Capabilities,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(store: Arc<Storage>, caps: Capabilities, retry: RetryPolicy) -> Self {
        Self { store, caps, retry }
    }

    pub fn store(&self) -> &Arc<Storage> {
        &self.store
    }

    /// Run every stage of a QUEUED job.
    ///
    /// Returns the outcome for both COMPLETED and FAILED jobs. Errors are
    /// reserved for jobs that cannot run (`NotFound`, `InvalidTransition` for
    /// anything not QUEUED) and for storage failures mid-run, after which the
    /// job is marked FAILED on a best-effort basis.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn run(&self, job_id: &JobId, progress: &dyn ProgressReporter) -> Result<JobOutcome> {
        let start = Instant::now();
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Queued {
            return Err(SeoCompassError::invalid_transition(format!(
                "job {job_id} is {}, only QUEUED jobs can run",
                job.status
            )));
        }
        self.store
            .set_status(job_id, JobStatus::InProgress, None)
            .await?;
        info!(url = %job.url, "job started");

        let mut stages_completed = Vec::new();
        let failure = match self
            .drive(job_id, &job.url, progress, &mut stages_completed)
            .await
        {
            Ok(failure) => failure,
            Err(e) => {
                error!(error = %e, "pipeline aborted");
                self.mark_failed(job_id, &e.to_string()).await;
                return Err(e);
            }
        };

        let status = if failure.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        if let Err(e) = self
            .store
            .set_status(job_id, status, failure.as_deref())
            .await
        {
            error!(error = %e, "could not record final status");
            if status == JobStatus::Completed {
                self.mark_failed(job_id, &e.to_string()).await;
            }
            return Err(e);
        }

        let outcome = JobOutcome {
            job_id: job_id.clone(),
            status,
            error: failure,
            stages_completed,
            elapsed: start.elapsed(),
        };
        match &outcome.error {
            None => info!(elapsed_ms = outcome.elapsed.as_millis() as u64, "job completed"),
            Some(cause) => warn!(error = %cause, "job failed"),
        }
        progress.finished(&outcome);
        Ok(outcome)
    }

    /// Run the stages in order. `Ok(Some(cause))` means a stage exhausted its retries.
    async fn drive(
        &self,
        job_id: &JobId,
        raw_url: &str,
        progress: &dyn ProgressReporter,
        completed: &mut Vec<Stage>,
    ) -> Result<Option<String>> {
        let url = match parse_target_url(raw_url) {
            Ok(url) => url,
            Err(e) => return Ok(Some(e.to_string())),
        };
        let url = &url;

        // --- Stage 1: competitors ---
        let source = self.caps.competitors.as_ref();
        let call = move || async move {
            let items = source.discover_competitors(url).await?;
            contract::check_competitors(&items)?;
            Ok::<_, SeoCompassError>(StagePayload::Competitors(items))
        };
        match self.execute_stage(job_id, Stage::Competitors, progress, call).await? {
            StageRun::Done(_) => completed.push(Stage::Competitors),
            StageRun::Exhausted(cause) => return Ok(Some(cause)),
        }

        // --- Stage 2: keywords ---
        let source = self.caps.keywords.as_ref();
        let call = move || async move {
            let items = source.extract_keywords(url).await?;
            contract::check_keywords(&items)?;
            Ok::<_, SeoCompassError>(StagePayload::Keywords(items))
        };
        let keywords: Vec<Keyword> =
            match self.execute_stage(job_id, Stage::Keywords, progress, call).await? {
                StageRun::Done(StagePayload::Keywords(items)) => {
                    completed.push(Stage::Keywords);
                    items
                }
                StageRun::Done(other) => {
                    return Err(SeoCompassError::Storage(format!(
                        "keywords stage produced a {} payload",
                        other.stage()
                    )));
                }
                StageRun::Exhausted(cause) => return Ok(Some(cause)),
            };

        // --- Stage 3: drafts ---
        let writer = self.caps.drafts.as_ref();
        let keywords = keywords.as_slice();
        let call = move || async move {
            let items = writer.generate_drafts(keywords).await?;
            contract::check_drafts(&items)?;
            Ok::<_, SeoCompassError>(StagePayload::Drafts(items))
        };
        match self.execute_stage(job_id, Stage::Drafts, progress, call).await? {
            StageRun::Done(_) => completed.push(Stage::Drafts),
            StageRun::Exhausted(cause) => return Ok(Some(cause)),
        }

        Ok(None)
    }

    /// Retry the stage's adapter call, then persist its payload.
    async fn execute_stage<F, Fut>(
        &self,
        job_id: &JobId,
        stage: Stage,
        progress: &dyn ProgressReporter,
        call: F,
    ) -> Result<StageRun>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<StagePayload>>,
    {
        progress.stage_started(job_id, stage);
        debug!(%stage, "stage started");

        let attempt = self
            .retry
            .run(call, |attempt, delay, e| {
                warn!(
                    %stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "stage attempt failed, retrying"
                );
                progress.retrying(job_id, stage, attempt, delay, &e.to_string());
            })
            .await;

        match attempt {
            Ok(payload) => {
                self.store.put_result(job_id, stage, &payload).await?;
                info!(%stage, items = payload.len(), "stage completed");
                progress.stage_completed(job_id, stage, payload.len());
                Ok(StageRun::Done(payload))
            }
            Err(e) => Ok(StageRun::Exhausted(format!(
                "{stage} stage failed after {} attempts: {e}",
                self.retry.max_attempts.max(1)
            ))),
        }
    }

    async fn mark_failed(&self, job_id: &JobId, cause: &str) {
        if let Err(e) = self
            .store
            .set_status(job_id, JobStatus::Failed, Some(cause))
            .await
        {
            warn!(error = %e, "could not mark job FAILED");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BrokenDrafts, FlakyCompetitors, RecordingProgress, fast_retry, test_store};

    #[tokio::test]
    async fn successful_run_completes_all_stages() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let pipeline = Pipeline::new(store.clone(), Capabilities::mock(), fast_retry());

        let outcome = pipeline.run(&job.id, &SilentProgress).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(outcome.error, None);
        assert_eq!(outcome.stages_completed, Stage::ALL.to_vec());

        let stored = store.get_job(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.completed_at.is_some());

        let results = store.get_results(&job.id).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[&Stage::Competitors].payload.len(), 5);
        assert_eq!(results[&Stage::Keywords].payload.len(), 8);
        assert_eq!(results[&Stage::Drafts].payload.len(), 3);
    }

    #[tokio::test]
    async fn exhausted_competitors_fail_the_job() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let flaky = Arc::new(FlakyCompetitors::failing(u32::MAX));
        let caps = Capabilities {
            competitors: flaky.clone(),
            ..Capabilities::mock()
        };
        let pipeline = Pipeline::new(store.clone(), caps, fast_retry());

        let outcome = pipeline.run(&job.id, &SilentProgress).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert!(outcome.stages_completed.is_empty());
        assert_eq!(flaky.calls(), 3);

        let stored = store.get_job(&job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.completed_at.is_some());
        let error = stored.error.expect("error recorded");
        assert!(error.contains("competitors stage failed after 3 attempts"));

        assert!(store.get_results(&job.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let flaky = Arc::new(FlakyCompetitors::failing(2));
        let caps = Capabilities {
            competitors: flaky.clone(),
            ..Capabilities::mock()
        };
        let progress = RecordingProgress::default();
        let pipeline = Pipeline::new(store.clone(), caps, fast_retry());

        let outcome = pipeline.run(&job.id, &progress).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(flaky.calls(), 3);

        let events = progress.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.starts_with("retry competitors"))
                .count(),
            2
        );
        assert_eq!(events.last().map(String::as_str), Some("finished COMPLETED"));
    }

    #[tokio::test]
    async fn later_stage_failure_keeps_earlier_results() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let caps = Capabilities {
            drafts: Arc::new(BrokenDrafts),
            ..Capabilities::mock()
        };
        let pipeline = Pipeline::new(store.clone(), caps, fast_retry());

        let outcome = pipeline.run(&job.id, &SilentProgress).await.unwrap();
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(
            outcome.stages_completed,
            vec![Stage::Competitors, Stage::Keywords]
        );
        assert!(outcome.error.unwrap().contains("contract violation"));

        let results = store.get_results(&job.id).await.unwrap();
        assert!(results.contains_key(&Stage::Keywords));
        assert!(!results.contains_key(&Stage::Drafts));
    }

    #[tokio::test]
    async fn rerun_of_terminal_job_is_rejected_without_changes() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let pipeline = Pipeline::new(store.clone(), Capabilities::mock(), fast_retry());
        pipeline.run(&job.id, &SilentProgress).await.unwrap();

        let before_job = store.get_job(&job.id).await.unwrap();
        let before_results = store.get_results(&job.id).await.unwrap();

        let err = pipeline.run(&job.id, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::InvalidTransition { .. }));

        assert_eq!(store.get_job(&job.id).await.unwrap(), before_job);
        assert_eq!(store.get_results(&job.id).await.unwrap(), before_results);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = test_store().await;
        let pipeline = Pipeline::new(store, Capabilities::mock(), fast_retry());
        let err = pipeline
            .run(&JobId::new(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SeoCompassError::NotFound { .. }));
    }

    #[tokio::test]
    async fn concurrent_runs_execute_once() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let pipeline = Pipeline::new(store.clone(), Capabilities::mock(), fast_retry());

        let (a, b) = tokio::join!(
            pipeline.run(&job.id, &SilentProgress),
            pipeline.run(&job.id, &SilentProgress),
        );
        let outcomes: Vec<_> = [a, b].into_iter().filter_map(|r| r.ok()).collect();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn progress_sees_stage_order() {
        let store = test_store().await;
        let job = store.create_job("https://example.com").await.unwrap();
        let pipeline = Pipeline::new(store, Capabilities::mock(), fast_retry());
        let progress = RecordingProgress::default();
        pipeline.run(&job.id, &progress).await.unwrap();

        let expected = [
            "start competitors",
            "done competitors 5",
            "start keywords",
            "done keywords 8",
            "start drafts",
            "done drafts 3",
            "finished COMPLETED",
        ];
        assert_eq!(progress.events(), expected.map(String::from).to_vec());
    }
}
