//! Turso Embedded / libSQL storage layer for analysis jobs.
//!
//! The [`Storage`] struct is the Job Store: it owns persistence of jobs and
//! their per-stage analysis results and is the single source of truth for
//! job status.
//!
//! **Write rules:**
//! - Status only advances (`QUEUED → IN_PROGRESS → COMPLETED | FAILED`).
//! - Stage results are written only while a job is `IN_PROGRESS`, in stage order.
//! - Every `set_status` / `put_result` for one job id runs under that job's
//!   lock, and status changes are compare-and-set updates.

mod migrations;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use libsql::{Connection, Database, params};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};

use seocompass_shared::{
    AnalysisResult, Job, JobFilter, JobId, JobStatus, Result, SeoCompassError, Stage,
    StagePayload, StageResults, parse_target_url,
};

const JOB_COLUMNS: &str = "id, url, status, created_at, completed_at, error";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    locks: JobLocks,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeoCompassError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            locks: JobLocks::default(),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (report readers).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            locks: JobLocks::default(),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        SeoCompassError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(SeoCompassError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Job operations
    // -----------------------------------------------------------------------

    /// Create a QUEUED job for `url`. Fails with `Validation` on a malformed URL.
    #[instrument(skip(self))]
    pub async fn create_job(&self, url: &str) -> Result<Job> {
        self.check_writable()?;
        parse_target_url(url)?;

        let job = Job {
            id: JobId::new(),
            url: url.trim().to_string(),
            status: JobStatus::Queued,
            created_at: now(),
            completed_at: None,
            error: None,
        };

        self.conn
            .execute(
                "INSERT INTO jobs (id, url, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    job.id.to_string(),
                    job.url.as_str(),
                    job.status.as_str(),
                    timestamp(&job.created_at),
                ],
            )
            .await
            .map_err(db_err)?;

        info!(job_id = %job.id, url = %job.url, "job created");
        Ok(job)
    }

    /// Get a job by id, failing with `NotFound` if it does not exist.
    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        self.find_job(&id.to_string())
            .await?
            .ok_or_else(|| SeoCompassError::not_found(id))
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    /// List jobs newest first, optionally filtered, with 1-based offset pagination.
    pub async fn list_jobs(&self, filter: &JobFilter, page: i64, limit: i64) -> Result<Vec<Job>> {
        if page <= 0 {
            return Err(SeoCompassError::invalid_argument(format!(
                "page must be positive, got {page}"
            )));
        }
        if limit <= 0 {
            return Err(SeoCompassError::invalid_argument(format!(
                "limit must be positive, got {limit}"
            )));
        }
        let offset = (page - 1).saturating_mul(limit);

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     WHERE (?1 IS NULL OR url = ?1) AND (?2 IS NULL OR status = ?2)
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?3 OFFSET ?4"
                ),
                params![
                    filter.url.as_deref(),
                    filter.status.map(|s| s.as_str()),
                    limit,
                    offset
                ],
            )
            .await
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Count jobs matching `filter`.
    pub async fn count_jobs(&self, filter: &JobFilter) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM jobs
                 WHERE (?1 IS NULL OR url = ?1) AND (?2 IS NULL OR status = ?2)",
                params![filter.url.as_deref(), filter.status.map(|s| s.as_str())],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Advance a job's status.
    ///
    /// `error` is required for FAILED and rejected otherwise. A QUEUED job may
    /// jump straight to a terminal status only if no stage result exists.
    #[instrument(skip(self, error), fields(job_id = %id, to = %status))]
    pub async fn set_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<Job> {
        self.check_writable()?;
        let error = match (status, error.map(str::trim)) {
            (JobStatus::Failed, Some(msg)) if !msg.is_empty() => Some(msg.to_string()),
            (JobStatus::Failed, _) => {
                return Err(SeoCompassError::validation(
                    "a FAILED status requires an error message",
                ));
            }
            (_, Some(_)) => {
                return Err(SeoCompassError::validation(format!(
                    "an error message is only allowed with FAILED, not {status}"
                )));
            }
            (_, None) => None,
        };

        let key = id.to_string();
        let _guard = self.locks.acquire(&key).await;

        let Some(current) = self.find_job(&key).await? else {
            self.locks.prune(&key);
            return Err(SeoCompassError::not_found(id));
        };

        if !current.status.can_advance_to(status) {
            return Err(SeoCompassError::invalid_transition(format!(
                "job {id}: {} -> {status}",
                current.status
            )));
        }
        if current.status == JobStatus::Queued
            && status.is_terminal()
            && self.count_results(&key).await? > 0
        {
            return Err(SeoCompassError::invalid_transition(format!(
                "job {id}: stages already ran, {status} must follow IN_PROGRESS"
            )));
        }

        let completed_at = status.is_terminal().then(now);
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, completed_at = ?2, error = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    status.as_str(),
                    completed_at.as_ref().map(timestamp),
                    error.as_deref(),
                    key.as_str(),
                    current.status.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        if changed == 0 {
            return Err(SeoCompassError::invalid_transition(format!(
                "job {id} changed concurrently (expected {})",
                current.status
            )));
        }

        if status.is_terminal() {
            self.locks.prune(&key);
        }

        debug!(from = %current.status, "status advanced");
        Ok(Job {
            status,
            completed_at,
            error,
            ..current
        })
    }

    // -----------------------------------------------------------------------
    // Analysis result operations
    // -----------------------------------------------------------------------

    /// Upsert the result of `stage` for a running job.
    ///
    /// The job must be IN_PROGRESS and the preceding stage's result must exist.
    #[instrument(skip(self, payload), fields(job_id = %job_id, stage = %stage, items = payload.len()))]
    pub async fn put_result(
        &self,
        job_id: &JobId,
        stage: Stage,
        payload: &StagePayload,
    ) -> Result<AnalysisResult> {
        self.check_writable()?;
        if payload.stage() != stage {
            return Err(SeoCompassError::validation(format!(
                "{} payload cannot be stored as {stage}",
                payload.stage()
            )));
        }

        let key = job_id.to_string();
        let _guard = self.locks.acquire(&key).await;

        let Some(job) = self.find_job(&key).await? else {
            self.locks.prune(&key);
            return Err(SeoCompassError::not_found(job_id));
        };

        if job.status != JobStatus::InProgress {
            return Err(SeoCompassError::invalid_transition(format!(
                "job {job_id} is {}, results are only written while IN_PROGRESS",
                job.status
            )));
        }
        if let Some(previous) = stage.previous() {
            if !self.has_result(&key, previous).await? {
                return Err(SeoCompassError::invalid_transition(format!(
                    "job {job_id}: {stage} result requires a {previous} result"
                )));
            }
        }

        let produced_at = now();
        self.conn
            .execute(
                "INSERT INTO analysis_results (job_id, stage, payload_json, produced_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(job_id, stage) DO UPDATE SET
                   payload_json = excluded.payload_json,
                   produced_at = excluded.produced_at",
                params![
                    key.as_str(),
                    stage.as_str(),
                    payload.to_json()?,
                    timestamp(&produced_at),
                ],
            )
            .await
            .map_err(db_err)?;

        Ok(AnalysisResult {
            job_id: job_id.clone(),
            stage,
            payload: payload.clone(),
            produced_at,
        })
    }

    /// All results recorded for a job so far. Fails with `NotFound` for unknown jobs.
    pub async fn get_results(&self, job_id: &JobId) -> Result<StageResults> {
        let key = job_id.to_string();
        if self.find_job(&key).await?.is_none() {
            return Err(SeoCompassError::not_found(job_id));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT stage, payload_json, produced_at FROM analysis_results WHERE job_id = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(db_err)?;

        let mut results = StageResults::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let stage: Stage = row
                .get::<String>(0)
                .map_err(db_err)?
                .parse()
                .map_err(|e| SeoCompassError::Storage(format!("invalid stage column: {e}")))?;
            let payload_json: String = row.get(1).map_err(db_err)?;
            let produced_at = parse_timestamp(&row.get::<String>(2).map_err(db_err)?)?;

            results.insert(
                stage,
                AnalysisResult {
                    job_id: job_id.clone(),
                    stage,
                    payload: StagePayload::from_json(stage, &payload_json)?,
                    produced_at,
                },
            );
        }
        Ok(results)
    }

    async fn has_result(&self, job_id: &str, stage: Stage) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM analysis_results WHERE job_id = ?1 AND stage = ?2",
                params![job_id, stage.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.next().await.map_err(db_err)?.is_some())
    }

    async fn count_results(&self, job_id: &str) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM analysis_results WHERE job_id = ?1",
                params![job_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>(0).map_err(db_err),
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-job serialization
// ---------------------------------------------------------------------------

/// One async mutex per job id, created on demand.
#[derive(Default)]
struct JobLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobLocks {
    async fn acquire(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(job_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drop the lock of a finished or unknown job unless another caller is waiting on it.
    /// Must be called while holding that job's guard.
    fn prune(&self, job_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // map entry + the caller's guard
        if map.get(job_id).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            map.remove(job_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> SeoCompassError {
    SeoCompassError::Storage(e.to_string())
}

/// Current time truncated to the stored precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SeoCompassError::Storage(format!("invalid date '{s}': {e}")))
}

/// Convert a database row (in `JOB_COLUMNS` order) to a [`Job`].
fn row_to_job(row: &libsql::Row) -> Result<Job> {
    let id: String = row.get(0).map_err(db_err)?;
    let status: String = row.get(2).map_err(db_err)?;

    Ok(Job {
        id: id
            .parse()
            .map_err(|e| SeoCompassError::Storage(format!("invalid job id '{id}': {e}")))?,
        url: row.get::<String>(1).map_err(db_err)?,
        status: status
            .parse()
            .map_err(|e| SeoCompassError::Storage(format!("invalid status column: {e}")))?,
        created_at: parse_timestamp(&row.get::<String>(3).map_err(db_err)?)?,
        completed_at: row
            .get::<String>(4)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
        error: row.get::<String>(5).ok(),
    })
}
