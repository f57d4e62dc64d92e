//! External capability adapters: competitor discovery, keyword extraction
//! and content generation.
//!
//! Each capability is a narrow async trait with a live implementation backed
//! by an external service and a deterministic mock. [`Capabilities`] picks one
//! of each from configuration; the pipeline only ever sees the trait objects.

pub mod contract;
mod competitors;
mod drafts;
mod keywords;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;

use seocompass_shared::{
    AdapterMode, AppConfig, Competitor, Keyword, PageDraft, Result, SeoCompassError,
    api_key_from_env, require_api_key,
};

pub use competitors::{MockCompetitorSource, SerpCompetitorSource};
pub use drafts::{LlmDraftWriter, MockDraftWriter};
pub use keywords::{HtmlKeywordSource, MockKeywordSource};

/// User-Agent for API requests (page fetches use the configured one).
const USER_AGENT: &str = concat!("SEO-Compass/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Finds sites ranking against the target URL.
#[async_trait]
pub trait CompetitorSource: Send + Sync {
    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str;

    /// At most 10 competitors, ranks strictly increasing from 1.
    async fn discover_competitors(&self, url: &Url) -> Result<Vec<Competitor>>;
}

/// Extracts ranking keywords for the target URL.
#[async_trait]
pub trait KeywordSource: Send + Sync {
    fn name(&self) -> &str;

    /// At most 10 keywords with difficulty in `[0, 1]`.
    async fn extract_keywords(&self, url: &Url) -> Result<Vec<Keyword>>;
}

/// Writes page content drafts from a keyword set.
#[async_trait]
pub trait DraftWriter: Send + Sync {
    fn name(&self) -> &str;

    /// Exactly one draft for each of home, services and about.
    async fn generate_drafts(&self, keywords: &[Keyword]) -> Result<Vec<PageDraft>>;
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The adapter set a pipeline runs with.
#[derive(Clone)]
pub struct Capabilities {
    pub competitors: Arc<dyn CompetitorSource>,
    pub keywords: Arc<dyn KeywordSource>,
    pub drafts: Arc<dyn DraftWriter>,
}

impl Capabilities {
    /// Deterministic mocks for every capability.
    pub fn mock() -> Self {
        Self {
            competitors: Arc::new(MockCompetitorSource),
            keywords: Arc::new(MockKeywordSource),
            drafts: Arc::new(MockDraftWriter),
        }
    }

    /// Select implementations per the `mode` of each adapter section.
    ///
    /// `auto` goes live when the section's API key env var is set. Keyword
    /// extraction needs no key, so `auto` always fetches the page.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let serp = &config.competitors;
        let competitors: Arc<dyn CompetitorSource> = match serp.mode {
            AdapterMode::Mock => Arc::new(MockCompetitorSource),
            AdapterMode::Live => Arc::new(SerpCompetitorSource::new(
                &serp.base_url,
                require_api_key(&serp.api_key_env)?,
                serp.timeout_secs,
            )?),
            AdapterMode::Auto => match api_key_from_env(&serp.api_key_env) {
                Some(key) => Arc::new(SerpCompetitorSource::new(
                    &serp.base_url,
                    key,
                    serp.timeout_secs,
                )?),
                None => Arc::new(MockCompetitorSource),
            },
        };

        let kw = &config.keywords;
        let keywords: Arc<dyn KeywordSource> = match kw.mode {
            AdapterMode::Mock => Arc::new(MockKeywordSource),
            AdapterMode::Live | AdapterMode::Auto => {
                Arc::new(HtmlKeywordSource::new(&kw.user_agent, kw.timeout_secs)?)
            }
        };

        let llm = &config.drafts;
        let drafts: Arc<dyn DraftWriter> = match llm.mode {
            AdapterMode::Mock => Arc::new(MockDraftWriter),
            AdapterMode::Live => Arc::new(LlmDraftWriter::new(
                &llm.base_url,
                require_api_key(&llm.api_key_env)?,
                &llm.model,
                llm.timeout_secs,
            )?),
            AdapterMode::Auto => match api_key_from_env(&llm.api_key_env) {
                Some(key) => Arc::new(LlmDraftWriter::new(
                    &llm.base_url,
                    key,
                    &llm.model,
                    llm.timeout_secs,
                )?),
                None => Arc::new(MockDraftWriter),
            },
        };

        let caps = Self {
            competitors,
            keywords,
            drafts,
        };
        info!(
            competitors = caps.competitors.name(),
            keywords = caps.keywords.name(),
            drafts = caps.drafts.name(),
            "capabilities selected"
        );
        Ok(caps)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with the given User-Agent and timeout.
fn build_client(user_agent: &str, timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| SeoCompassError::config(format!("failed to build HTTP client: {e}")))
}

/// Parse and normalize a configured service base URL (no trailing slash).
fn normalize_base_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SeoCompassError::config(format!("invalid base_url '{raw}': {e}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Deterministic value in `lo..=hi` derived from `seed`.
///
/// Mocks and estimated metrics use this instead of randomness so repeated
/// runs over the same input produce identical reports.
pub(crate) fn seeded_in_range(seed: &str, lo: u64, hi: u64) -> u64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let span = hi.saturating_sub(lo) + 1;
    lo + u64::from_le_bytes(bytes) % span
}

/// Deterministic difficulty in `[lo, hi]`, rounded to two decimals.
pub(crate) fn seeded_difficulty(seed: &str, lo: f64, hi: f64) -> f64 {
    let lo_pct = (lo * 100.0).round() as u64;
    let hi_pct = (hi * 100.0).round() as u64;
    seeded_in_range(&format!("difficulty:{seed}"), lo_pct, hi_pct) as f64 / 100.0
}

/// Host without a leading `www.`, lowercased.
pub(crate) fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}
