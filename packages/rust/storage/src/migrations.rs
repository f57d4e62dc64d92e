//! SQL migration definitions for the SEO Compass database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: jobs, analysis_results",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Analysis jobs
CREATE TABLE IF NOT EXISTS jobs (
    id           TEXT PRIMARY KEY,
    url          TEXT NOT NULL,
    status       TEXT NOT NULL CHECK (status IN ('QUEUED', 'IN_PROGRESS', 'COMPLETED', 'FAILED')),
    created_at   TEXT NOT NULL,
    completed_at TEXT,
    error        TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- One result per (job, stage)
CREATE TABLE IF NOT EXISTS analysis_results (
    job_id       TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    stage        TEXT NOT NULL CHECK (stage IN ('competitors', 'keywords', 'drafts')),
    payload_json TEXT NOT NULL,
    produced_at  TEXT NOT NULL,
    PRIMARY KEY (job_id, stage)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index jobs by url for history filtering",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_jobs_url ON jobs(url);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
