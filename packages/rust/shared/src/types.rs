//! Core domain types for SEO Compass analysis jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, SeoCompassError};

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an analysis job. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// `true` for COMPLETED and FAILED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a forward edge of the lifecycle.
    ///
    /// QUEUED may jump straight to a terminal status; the store additionally
    /// requires that no stage result exists in that case.
    pub fn can_advance_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InProgress)
                | (Self::Queued, Self::Completed)
                | (Self::Queued, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = SeoCompassError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(SeoCompassError::validation(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One submitted URL's analysis lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    #[serde(rename = "job_id")]
    pub id: JobId,
    /// Submitted target URL.
    pub url: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job reached COMPLETED or FAILED.
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure cause, only for FAILED jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validate a submitted target: absolute `http`/`https` URL with a host.
pub fn parse_target_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SeoCompassError::validation(format!("invalid URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SeoCompassError::validation(format!(
            "invalid URL '{raw}': scheme must be http or https"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SeoCompassError::validation(format!(
            "invalid URL '{raw}': missing host"
        )));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the ordered analysis steps. `Ord` follows pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Competitors,
    Keywords,
    Drafts,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 3] = [Stage::Competitors, Stage::Keywords, Stage::Drafts];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Competitors => "competitors",
            Self::Keywords => "keywords",
            Self::Drafts => "drafts",
        }
    }

    /// The stage whose result must exist before this one may be written.
    pub fn previous(&self) -> Option<Stage> {
        match self {
            Self::Competitors => None,
            Self::Keywords => Some(Self::Competitors),
            Self::Drafts => Some(Self::Keywords),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = SeoCompassError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "competitors" => Ok(Self::Competitors),
            "keywords" => Ok(Self::Keywords),
            "drafts" => Ok(Self::Drafts),
            other => Err(SeoCompassError::invalid_argument(format!(
                "unknown section '{other}' (expected competitors, keywords or drafts)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage payloads
// ---------------------------------------------------------------------------

/// A ranking competitor discovered for the target URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub rank: u32,
    pub url: String,
    pub keyword: String,
    pub estimated_traffic: u64,
}

/// A keyword extracted for the target URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    pub search_volume: u64,
    /// Ranking difficulty in `[0, 1]`.
    pub difficulty: f64,
}

/// Fixed set of pages a content draft is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageName {
    Home,
    Services,
    About,
}

impl PageName {
    pub const ALL: [PageName; 3] = [PageName::Home, PageName::Services, PageName::About];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Services => "services",
            Self::About => "about",
        }
    }
}

impl fmt::Display for PageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated content draft for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDraft {
    pub page_name: PageName,
    pub content: String,
}

/// Structured output of one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    Competitors(Vec<Competitor>),
    Keywords(Vec<Keyword>),
    Drafts(Vec<PageDraft>),
}

impl StagePayload {
    /// The stage this payload belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Competitors(_) => Stage::Competitors,
            Self::Keywords(_) => Stage::Keywords,
            Self::Drafts(_) => Stage::Drafts,
        }
    }

    /// Number of entries in the payload.
    pub fn len(&self) -> usize {
        match self {
            Self::Competitors(v) => v.len(),
            Self::Keywords(v) => v.len(),
            Self::Drafts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the inner entries as a JSON array.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Competitors(v) => serde_json::to_string(v),
            Self::Keywords(v) => serde_json::to_string(v),
            Self::Drafts(v) => serde_json::to_string(v),
        };
        json.map_err(|e| SeoCompassError::Storage(format!("payload encode: {e}")))
    }

    /// Decode a JSON array written by [`StagePayload::to_json`].
    pub fn from_json(stage: Stage, json: &str) -> Result<Self> {
        let decode_err =
            |e: serde_json::Error| SeoCompassError::Storage(format!("{stage} payload decode: {e}"));
        Ok(match stage {
            Stage::Competitors => Self::Competitors(serde_json::from_str(json).map_err(decode_err)?),
            Stage::Keywords => Self::Keywords(serde_json::from_str(json).map_err(decode_err)?),
            Stage::Drafts => Self::Drafts(serde_json::from_str(json).map_err(decode_err)?),
        })
    }
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// The persisted output of one stage for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub job_id: JobId,
    pub stage: Stage,
    pub payload: StagePayload,
    pub produced_at: DateTime<Utc>,
}

/// Available results of a job, keyed by stage (may be partial).
pub type StageResults = BTreeMap<Stage, AnalysisResult>;

// ---------------------------------------------------------------------------
// JobFilter
// ---------------------------------------------------------------------------

/// Optional filters for job history queries.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Exact match on the submitted URL.
    pub url: Option<String>,
    /// Only jobs currently in this status.
    pub status: Option<JobStatus>,
}
