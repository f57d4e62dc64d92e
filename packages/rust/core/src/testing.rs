//! Test doubles shared by the core test modules.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;
use uuid::Uuid;

use seocompass_adapters::{CompetitorSource, DraftWriter, MockCompetitorSource};
use seocompass_shared::{
    Competitor, JobId, Keyword, PageDraft, PageName, Result, SeoCompassError, Stage,
};
use seocompass_storage::Storage;

use crate::pipeline::{JobOutcome, ProgressReporter};
use crate::retry::RetryPolicy;

/// Temp file store, unique per test.
pub(crate) async fn test_store() -> Arc<Storage> {
    let tmp = std::env::temp_dir().join(format!("seocompass_core_{}.db", Uuid::now_v7()));
    Arc::new(Storage::open(&tmp).await.expect("open test db"))
}

/// Three attempts with millisecond backoff.
pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

/// Fails the first `failures` calls, then answers like the mock.
pub(crate) struct FlakyCompetitors {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyCompetitors {
    pub(crate) fn failing(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompetitorSource for FlakyCompetitors {
    fn name(&self) -> &str {
        "flaky-competitors"
    }

    async fn discover_competitors(&self, url: &Url) -> Result<Vec<Competitor>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(SeoCompassError::Adapter(format!("serp timeout (call {call})")));
        }
        MockCompetitorSource.discover_competitors(url).await
    }
}

/// Always returns two drafts instead of three.
pub(crate) struct BrokenDrafts;

#[async_trait]
impl DraftWriter for BrokenDrafts {
    fn name(&self) -> &str {
        "broken-drafts"
    }

    async fn generate_drafts(&self, _keywords: &[Keyword]) -> Result<Vec<PageDraft>> {
        Ok([PageName::Home, PageName::About]
            .into_iter()
            .map(|page_name| PageDraft {
                page_name,
                content: String::new(),
            })
            .collect())
    }
}

/// Records progress callbacks as short strings.
#[derive(Default)]
pub(crate) struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    fn push(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl ProgressReporter for RecordingProgress {
    fn stage_started(&self, _job_id: &JobId, stage: Stage) {
        self.push(format!("start {stage}"));
    }

    fn retrying(&self, _: &JobId, stage: Stage, attempt: u32, _: Duration, _: &str) {
        self.push(format!("retry {stage} {attempt}"));
    }

    fn stage_completed(&self, _job_id: &JobId, stage: Stage, items: usize) {
        self.push(format!("done {stage} {items}"));
    }

    fn finished(&self, outcome: &JobOutcome) {
        self.push(format!("finished {}", outcome.status));
    }
}
