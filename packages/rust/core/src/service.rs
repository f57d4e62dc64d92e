//! Analysis service: the request/response contract of the HTTP surface.
//!
//! | Operation | HTTP | Success |
//! |---|---|---|
//! | [`AnalysisService::submit`] | `POST /analyze` | 200 + `{job_id, status}` |
//! | [`AnalysisService::job_status`] | `GET /analyze/{id}/status` | 200 + job |
//! | [`AnalysisService::report`] | `GET /report/{id}?section=` | 200 + report |
//! | [`AnalysisService::download`] | `GET /report/{id}/download` | 200 + ZIP |
//! | [`AnalysisService::history`] | `GET /history` | 200 + page |
//!
//! Errors map to status codes through [`SeoCompassError::http_status`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use seocompass_shared::{ArchiveCompression, Job, JobFilter, JobId, JobStatus, Result, SeoCompassError};
use seocompass_storage::Storage;

use crate::dispatch::DispatchHandle;
use crate::report::{Report, ReportAssembler, parse_sections};

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// Largest page size a history query may ask for.
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// A packaged report ready to send as an attachment.
#[derive(Debug, Clone)]
pub struct ReportDownload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ReportDownload {
    pub const CONTENT_TYPE: &'static str = "application/zip";
}

/// Filters and pagination for [`AnalysisService::history`].
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub url: Option<String>,
    pub status: Option<JobStatus>,
    pub page: i64,
    pub limit: i64,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            url: None,
            status: None,
            page: 1,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// One page of job history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Job>,
    pub page: i64,
    pub limit: i64,
    pub total: u64,
    /// Number of pages at this `limit`.
    pub pages: u64,
}

/// Facade over the job store, report assembler and dispatch queue.
#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<Storage>,
    reports: ReportAssembler,
    dispatch: Option<DispatchHandle>,
}

impl AnalysisService {
    /// A service that records submissions without running them.
    ///
    /// Jobs stay QUEUED until a worker picks them up; see [`Self::with_dispatch`].
    pub fn new(store: Arc<Storage>, compression: ArchiveCompression) -> Self {
        Self {
            reports: ReportAssembler::new(store.clone(), compression),
            store,
            dispatch: None,
        }
    }

    /// Enqueue every accepted submission on `dispatch`.
    pub fn with_dispatch(mut self, dispatch: DispatchHandle) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// Validate and record a URL, then hand it to the dispatch queue.
    ///
    /// A job that cannot be enqueued stays QUEUED and is still accepted;
    /// the `worker` command picks it up later.
    #[instrument(skip(self))]
    pub async fn submit(&self, url: &str) -> Result<SubmitResponse> {
        let job = self.store.create_job(url).await?;
        if let Some(dispatch) = &self.dispatch {
            if let Err(e) = dispatch.enqueue(&job.id).await {
                warn!(job_id = %job.id, error = %e, "job left QUEUED");
            }
        }
        info!(job_id = %job.id, "analysis submitted");
        Ok(SubmitResponse {
            job_id: job.id,
            status: job.status,
        })
    }

    pub async fn job_status(&self, job_id: &str) -> Result<Job> {
        self.store.get_job(&parse_job_id(job_id)?).await
    }

    /// Report for a job, optionally limited by a `section` query.
    pub async fn report(&self, job_id: &str, section: Option<&str>) -> Result<Report> {
        let id = parse_job_id(job_id)?;
        let sections = section.map(parse_sections).transpose()?;
        self.reports.get_report(&id, sections.as_deref()).await
    }

    /// The report archive of a COMPLETED job.
    pub async fn download(&self, job_id: &str) -> Result<ReportDownload> {
        let id = parse_job_id(job_id)?;
        let bytes = self.reports.package_report(&id).await?;
        Ok(ReportDownload {
            filename: format!("seo_compass_report_{id}.zip"),
            bytes,
        })
    }

    /// Page through jobs; `limit` may not exceed [`MAX_HISTORY_LIMIT`].
    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryPage> {
        if query.limit > MAX_HISTORY_LIMIT {
            return Err(SeoCompassError::invalid_argument(format!(
                "limit {} exceeds {MAX_HISTORY_LIMIT}",
                query.limit
            )));
        }
        let filter = JobFilter {
            url: query.url.clone(),
            status: query.status,
        };
        let items = self
            .store
            .list_jobs(&filter, query.page, query.limit)
            .await?;
        let total = self.store.count_jobs(&filter).await?;
        // list_jobs has already rejected a non-positive limit
        let pages = total.div_ceil(query.limit as u64);
        Ok(HistoryPage {
            items,
            page: query.page,
            limit: query.limit,
            total,
            pages,
        })
    }
}

/// A malformed id can never name a job, so it is reported as unknown.
fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.trim()
        .parse()
        .map_err(|_| SeoCompassError::not_found(raw))
}
