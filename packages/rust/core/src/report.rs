//! Report assembly: read-time aggregation of a job and whatever results exist.
//!
//! Reports are never cached. A running or failed job yields the sections
//! persisted so far; only archive packaging requires a COMPLETED job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use seocompass_artifacts::ArchiveContents;
use seocompass_shared::{
    ArchiveCompression, Competitor, JobId, JobStatus, Keyword, PageDraft, Result,
    SeoCompassError, Stage, StagePayload,
};
use seocompass_storage::Storage;

/// A job plus the sections it has so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub job_id: JobId,
    pub url: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sections included below, in stage order.
    pub sections_present: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competitors: Option<Vec<Competitor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<Keyword>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drafts: Option<Vec<PageDraft>>,
}

impl Report {
    pub fn has_section(&self, stage: Stage) -> bool {
        self.sections_present.contains(&stage)
    }
}

/// Parse a section query: `all`, one stage name, or a comma-separated list.
///
/// Returns the stages in pipeline order without duplicates. Unknown names
/// fail with `InvalidArgument`.
pub fn parse_sections(raw: &str) -> Result<Vec<Stage>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        return Ok(Stage::ALL.to_vec());
    }
    let mut stages = raw
        .split(',')
        .map(str::parse::<Stage>)
        .collect::<Result<Vec<_>>>()?;
    stages.sort();
    stages.dedup();
    Ok(stages)
}

/// Builds reports and archives from the job store.
#[derive(Clone)]
pub struct ReportAssembler {
    store: Arc<Storage>,
    compression: ArchiveCompression,
}

impl ReportAssembler {
    pub fn new(store: Arc<Storage>, compression: ArchiveCompression) -> Self {
        Self { store, compression }
    }

    /// Current report for `job_id`, limited to `sections` when given.
    ///
    /// Missing sections are omitted; a QUEUED job yields an empty report.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn get_report(&self, job_id: &JobId, sections: Option<&[Stage]>) -> Result<Report> {
        let job = self.store.get_job(job_id).await?;
        let results = self.store.get_results(job_id).await?;
        let wanted = |stage: Stage| sections.is_none_or(|s| s.contains(&stage));

        let mut report = Report {
            job_id: job.id,
            url: job.url,
            status: job.status,
            created_at: job.created_at,
            completed_at: job.completed_at,
            error: job.error,
            sections_present: Vec::new(),
            competitors: None,
            keywords: None,
            drafts: None,
        };

        // BTreeMap iteration is stage order
        for (stage, result) in results {
            if !wanted(stage) {
                continue;
            }
            match result.payload {
                StagePayload::Competitors(items) => report.competitors = Some(items),
                StagePayload::Keywords(items) => report.keywords = Some(items),
                StagePayload::Drafts(items) => report.drafts = Some(items),
            }
            report.sections_present.push(stage);
        }

        debug!(sections = ?report.sections_present, status = %report.status, "report assembled");
        Ok(report)
    }

    /// ZIP archive of a COMPLETED job's report; `NotReady` otherwise.
    ///
    /// Always six entries, including for jobs completed without every stage.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn package_report(&self, job_id: &JobId) -> Result<Vec<u8>> {
        let job = self.store.get_job(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(SeoCompassError::not_ready(format!(
                "job {job_id} is {}, archives are only available once COMPLETED",
                job.status
            )));
        }

        // Sections that never ran are packaged empty and left out of
        // `sections_present`.
        let report = self.get_report(job_id, None).await?;
        let competitors = report.competitors.as_deref().unwrap_or_default();
        let keywords = report.keywords.as_deref().unwrap_or_default();
        let drafts = report.drafts.as_deref().unwrap_or_default();

        seocompass_artifacts::package(
            &ArchiveContents {
                job: &job,
                sections_present: &report.sections_present,
                competitors,
                keywords,
                drafts,
            },
            self.compression,
        )
    }
}
