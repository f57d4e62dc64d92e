//! Shared types, error model, and configuration for SEO Compass.
//!
//! This crate is the foundation depended on by all other SEO Compass crates.
//! It provides:
//! - [`SeoCompassError`]: the unified error type
//! - Domain types ([`Job`], [`JobStatus`], [`Stage`], [`AnalysisResult`], stage payloads)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AdapterMode, AppConfig, ArchiveCompression, ArchiveConfig, CompetitorsConfig, DefaultsConfig,
    DraftsConfig, KeywordsConfig, PipelineConfig, PipelineSection, api_key_from_env, config_dir,
    config_file_path, database_path, init_config, load_config, load_config_from, require_api_key,
};
pub use error::{Result, SeoCompassError};
pub use types::{
    AnalysisResult, Competitor, Job, JobFilter, JobId, JobStatus, Keyword, PageDraft, PageName,
    Stage, StagePayload, StageResults, parse_target_url,
};
