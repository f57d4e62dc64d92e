//! Competitor discovery: SerpAPI-backed search and a fixed mock list.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use seocompass_shared::{Competitor, Result, SeoCompassError};

use crate::contract::MAX_COMPETITORS;
use crate::{
    CompetitorSource, USER_AGENT, bare_host, build_client, normalize_base_url, seeded_in_range,
};

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// `(url, keyword, traffic range)` per rank.
const MOCK_COMPETITORS: [(&str, &str, u64, u64); 5] = [
    ("https://competitor1.com", "business services", 10_000, 50_000),
    ("https://competitor2.com", "professional consulting", 8_000, 40_000),
    ("https://competitor3.com", "expert solutions", 5_000, 30_000),
    ("https://competitor4.com", "business consulting", 3_000, 25_000),
    ("https://competitor5.com", "professional services", 2_000, 20_000),
];

/// Five fixed competitors; traffic is derived from the target URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCompetitorSource;

#[async_trait]
impl CompetitorSource for MockCompetitorSource {
    fn name(&self) -> &str {
        "mock-competitors"
    }

    async fn discover_competitors(&self, url: &Url) -> Result<Vec<Competitor>> {
        Ok(MOCK_COMPETITORS
            .iter()
            .zip(1u32..)
            .map(|(&(site, keyword, lo, hi), rank)| Competitor {
                rank,
                url: site.to_string(),
                keyword: keyword.to_string(),
                estimated_traffic: seeded_in_range(&format!("{url}#{rank}"), lo, hi),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// SerpAPI
// ---------------------------------------------------------------------------

/// Assumed monthly searches for the query, spread over positions by CTR.
const QUERY_MONTHLY_SEARCHES: f64 = 50_000.0;

/// Organic click-through rate by position (1-based index into the slice).
const POSITION_CTR: [f64; 10] = [0.28, 0.15, 0.11, 0.08, 0.07, 0.05, 0.04, 0.03, 0.03, 0.02];

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
}

/// Competitors from a SerpAPI-compatible `search.json` endpoint.
///
/// The query is the target's bare host; every organic result on another
/// host becomes a competitor, re-ranked from 1 with one entry per host.
pub struct SerpCompetitorSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SerpCompetitorSource {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(USER_AGENT, timeout_secs)?,
            base_url: normalize_base_url(base_url)?,
            api_key,
        })
    }
}

#[async_trait]
impl CompetitorSource for SerpCompetitorSource {
    fn name(&self) -> &str {
        "serpapi"
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn discover_competitors(&self, url: &Url) -> Result<Vec<Competitor>> {
        let target_host = bare_host(url)
            .ok_or_else(|| SeoCompassError::validation(format!("URL has no host: {url}")))?;
        let endpoint = format!("{}/search.json", self.base_url);

        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("engine", "google"),
                ("q", target_host.as_str()),
                ("num", "20"),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoCompassError::Adapter(format!(
                "{endpoint}: HTTP {status}"
            )));
        }

        let body: SerpResponse = response
            .json()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{endpoint}: invalid response: {e}")))?;
        if let Some(error) = body.error {
            return Err(SeoCompassError::Adapter(format!("serpapi: {error}")));
        }

        let competitors = rank_competitors(&target_host, &body.organic_results);
        info!(count = competitors.len(), "competitors discovered");
        Ok(competitors)
    }
}

fn rank_competitors(target_host: &str, results: &[OrganicResult]) -> Vec<Competitor> {
    let mut seen = HashSet::new();
    let mut competitors = Vec::new();

    for result in results {
        let Ok(link) = Url::parse(&result.link) else {
            debug!(link = %result.link, "skipping unparsable result");
            continue;
        };
        let Some(host) = bare_host(&link) else {
            continue;
        };
        if host == target_host || !seen.insert(host) {
            continue;
        }

        let rank = competitors.len() as u32 + 1;
        let ctr = POSITION_CTR[competitors.len()];
        competitors.push(Competitor {
            rank,
            url: link.origin().ascii_serialization(),
            keyword: target_host.to_string(),
            estimated_traffic: (QUERY_MONTHLY_SEARCHES * ctr).round() as u64,
        });
        if competitors.len() == MAX_COMPETITORS {
            break;
        }
    }
    competitors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::check_competitors;

    fn organic(links: &[&str]) -> Vec<OrganicResult> {
        links
            .iter()
            .map(|l| OrganicResult {
                link: l.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn mock_is_deterministic_per_url() {
        let url = Url::parse("https://example.com").unwrap();
        let first = MockCompetitorSource.discover_competitors(&url).await.unwrap();
        let again = MockCompetitorSource.discover_competitors(&url).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(first.len(), 5);
        assert_eq!(
            first.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(first[0].url, "https://competitor1.com");
        assert!((10_000..=50_000).contains(&first[0].estimated_traffic));
        assert!(check_competitors(&first).is_ok());
    }

    #[test]
    fn ranking_skips_target_and_duplicate_hosts() {
        let results = organic(&[
            "https://www.example.com/about",
            "https://rival.io/pricing",
            "https://rival.io/blog",
            "not a url",
            "https://other.org/",
        ]);
        let ranked = rank_competitors("example.com", &results);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[0].url, "https://rival.io");
        assert_eq!(ranked[1].url, "https://other.org");
        assert_eq!(ranked[0].estimated_traffic, 14_000);
        assert!(ranked[0].estimated_traffic > ranked[1].estimated_traffic);
    }

    #[test]
    fn ranking_caps_at_ten() {
        let links: Vec<String> = (0..15).map(|i| format!("https://site{i}.com")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let ranked = rank_competitors("example.com", &organic(&refs));
        assert_eq!(ranked.len(), MAX_COMPETITORS);
        assert!(check_competitors(&ranked).is_ok());
    }

    #[tokio::test]
    async fn serp_maps_organic_results() {
        let server = wiremock::MockServer::start().await;
        let body = serde_json::json!({
            "organic_results": [
                { "position": 1, "link": "https://example.com/" },
                { "position": 2, "link": "https://rival.io/" },
                { "position": 3, "link": "https://another.net/page" }
            ]
        });

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/search.json"))
            .and(wiremock::matchers::query_param("q", "example.com"))
            .and(wiremock::matchers::query_param("api_key", "test-key"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let source = SerpCompetitorSource::new(&server.uri(), "test-key".into(), 5).unwrap();
        let url = Url::parse("https://example.com").unwrap();
        let competitors = source.discover_competitors(&url).await.unwrap();

        assert_eq!(competitors.len(), 2);
        assert_eq!(competitors[0].url, "https://rival.io");
        assert_eq!(competitors[1].rank, 2);
        assert_eq!(competitors[1].keyword, "example.com");
    }

    #[tokio::test]
    async fn serp_http_error_is_adapter_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = SerpCompetitorSource::new(&server.uri(), "k".into(), 5).unwrap();
        let url = Url::parse("https://example.com").unwrap();
        let err = source.discover_competitors(&url).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::Adapter(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn serp_error_payload_is_adapter_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "error": "Invalid API key." })),
            )
            .mount(&server)
            .await;

        let source = SerpCompetitorSource::new(&server.uri(), "bad".into(), 5).unwrap();
        let url = Url::parse("https://example.com").unwrap();
        let err = source.discover_competitors(&url).await.unwrap_err();
        assert!(err.to_string().contains("Invalid API key"));
    }
}
