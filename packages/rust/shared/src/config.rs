//! Application configuration for SEO Compass.
//!
//! User config lives at `~/.seocompass/seocompass.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoCompassError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seocompass.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seocompass";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "seocompass.db";

// ---------------------------------------------------------------------------
// Config structs (matching seocompass.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Retry policy for adapter calls.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Competitor discovery adapter.
    #[serde(default)]
    pub competitors: CompetitorsConfig,

    /// Keyword extraction adapter.
    #[serde(default)]
    pub keywords: KeywordsConfig,

    /// Content generation adapter.
    #[serde(default)]
    pub drafts: DraftsConfig,

    /// Report archive options.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database path. Empty means `~/.seocompass/seocompass.db`.
    #[serde(default)]
    pub database_path: String,

    /// Number of concurrent pipeline workers.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Bounded job queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: String::new(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> u32 {
    2
}
fn default_queue_capacity() -> u32 {
    64
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Attempts per stage before the job fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles afterwards.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    8_000
}

/// How an adapter implementation is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    /// Live when its API key is present, mock otherwise.
    #[default]
    Auto,
    /// Always the deterministic mock.
    Mock,
    /// Always the external service.
    Live,
}

/// `[competitors]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorsConfig {
    #[serde(default)]
    pub mode: AdapterMode,

    /// Name of the env var holding the SERP API key (never store the key itself).
    #[serde(default = "default_serp_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_serp_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompetitorsConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::Auto,
            api_key_env: default_serp_key_env(),
            base_url: default_serp_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_serp_key_env() -> String {
    "SERP_API_KEY".into()
}
fn default_serp_base_url() -> String {
    "https://serpapi.com".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[keywords]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default)]
    pub mode: AdapterMode,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::Auto,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("Mozilla/5.0 (compatible; SEO-Compass/", env!("CARGO_PKG_VERSION"), ")").into()
}

/// `[drafts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftsConfig {
    #[serde(default)]
    pub mode: AdapterMode,

    /// Name of the env var holding the LLM API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::Auto,
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

/// ZIP entry compression for report archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

/// `[archive]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: ArchiveCompression,
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Attempts per stage.
    pub max_attempts: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Concurrent workers in the dispatch pool.
    pub workers: usize,
    /// Bounded queue capacity.
    pub queue_capacity: usize,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.pipeline.max_attempts.max(1),
            base_delay: Duration::from_millis(config.pipeline.base_delay_ms),
            max_delay: Duration::from_millis(config.pipeline.max_delay_ms),
            workers: config.defaults.workers.max(1) as usize,
            queue_capacity: config.defaults.queue_capacity.max(1) as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seocompass/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SeoCompassError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seocompass/seocompass.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SeoCompassError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SeoCompassError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeoCompassError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoCompassError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoCompassError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the database file location from config.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    if config.defaults.database_path.trim().is_empty() {
        return Ok(config_dir()?.join(DATABASE_FILE_NAME));
    }
    Ok(PathBuf::from(&config.defaults.database_path))
}

/// Read a non-empty API key from the env var named by `var_name`.
pub fn api_key_from_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

/// Read the API key named by `var_name`, failing with a config error when it is missing.
pub fn require_api_key(var_name: &str) -> Result<String> {
    api_key_from_env(var_name).ok_or_else(|| {
        SeoCompassError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))
    })
}
