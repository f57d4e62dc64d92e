//! Keyword extraction: term frequency over a fetched page, plus a fixed mock list.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{info, instrument};
use url::Url;

use seocompass_shared::{Keyword, Result, SeoCompassError};

use crate::contract::MAX_KEYWORDS;
use crate::{KeywordSource, build_client, seeded_difficulty, seeded_in_range};

/// Maximum page size we are willing to analyze (5 MB).
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024;

/// Paragraphs beyond this index do not contribute to term counts.
const MAX_PARAGRAPHS: usize = 10;

const TOP_WORDS: usize = 15;
const TOP_PHRASES: usize = 10;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "this", "that", "these", "those", "i", "you", "he", "she", "it",
    "we", "they", "me", "him", "her", "us", "them", "my", "your", "his", "our",
];

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

const MOCK_KEYWORDS: [&str; 8] = [
    "business services",
    "professional consulting",
    "expert solutions",
    "digital marketing",
    "web development",
    "seo optimization",
    "content strategy",
    "online presence",
];

/// Eight fixed phrases with metrics derived from the phrase itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockKeywordSource;

#[async_trait]
impl KeywordSource for MockKeywordSource {
    fn name(&self) -> &str {
        "mock-keywords"
    }

    async fn extract_keywords(&self, _url: &Url) -> Result<Vec<Keyword>> {
        Ok(MOCK_KEYWORDS
            .iter()
            .map(|term| Keyword {
                keyword: term.to_string(),
                search_volume: seeded_in_range(term, 1_000, 30_000),
                difficulty: seeded_difficulty(term, 0.2, 0.8),
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// HTML term frequency
// ---------------------------------------------------------------------------

/// Fetches the target page and ranks its most frequent terms.
pub struct HtmlKeywordSource {
    client: Client,
    max_page_size: usize,
}

impl HtmlKeywordSource {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout_secs)?,
            max_page_size: MAX_PAGE_SIZE,
        })
    }

    /// Override the body size cap (bytes).
    pub fn with_max_page_size(mut self, bytes: usize) -> Self {
        self.max_page_size = bytes;
        self
    }

    async fn fetch_html(&self, url: &Url) -> Result<String> {
        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoCompassError::Adapter(format!("{url}: HTTP {status}")));
        }

        // Content-Length is optional (chunked bodies), so cap while reading.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{url}: failed to read body: {e}")))?
        {
            if body.len() + chunk.len() > self.max_page_size {
                return Err(SeoCompassError::Adapter(format!(
                    "{url}: page too large (max {} bytes)",
                    self.max_page_size
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl KeywordSource for HtmlKeywordSource {
    fn name(&self) -> &str {
        "html-keywords"
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn extract_keywords(&self, url: &Url) -> Result<Vec<Keyword>> {
        let html = self.fetch_html(url).await?;
        let text = visible_text(&html);

        let keywords: Vec<Keyword> = rank_terms(&text)
            .into_iter()
            .take(MAX_KEYWORDS)
            .map(|(term, _)| Keyword {
                search_volume: seeded_in_range(&term, 1_000, 50_000),
                difficulty: seeded_difficulty(&term, 0.1, 0.9),
                keyword: term,
            })
            .collect();

        info!(count = keywords.len(), "keywords extracted");
        Ok(keywords)
    }
}

/// Text of the elements that carry ranking signal: title, meta description,
/// h1-h3 headings and the leading paragraphs.
fn visible_text(html: &str) -> String {
    static TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));
    static META_DESC: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"meta[name="description"]"#).expect("valid selector")
    });
    static HEADINGS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h1, h2, h3").expect("valid selector"));
    static PARAGRAPHS: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("p").expect("valid selector"));

    let doc = Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = doc.select(&TITLE).next() {
        parts.push(title.text().collect());
    }
    if let Some(content) = doc
        .select(&META_DESC)
        .next()
        .and_then(|m| m.value().attr("content"))
    {
        parts.push(content.to_string());
    }
    parts.extend(doc.select(&HEADINGS).map(|h| h.text().collect::<String>()));
    parts.extend(
        doc.select(&PARAGRAPHS)
            .take(MAX_PARAGRAPHS)
            .map(|p| p.text().collect::<String>()),
    );

    parts.join(" ")
}

/// Top words and two-word phrases by frequency, most frequent first.
///
/// Ties keep first-occurrence order, words before phrases.
fn rank_terms(text: &str) -> Vec<(String, usize)> {
    static NON_WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

    let lowered = text.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, " ");
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .collect();

    let phrases: Vec<String> = words.windows(2).map(|w| format!("{} {}", w[0], w[1])).collect();

    let mut ranked = most_common(words.iter().map(|w| w.to_string()), TOP_WORDS);
    ranked.extend(most_common(phrases, TOP_PHRASES));
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

/// The `n` most frequent items, ties in first-seen order.
fn most_common(items: impl IntoIterator<Item = String>, n: usize) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();

    for item in items {
        match index.get(&item) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(item.clone(), counts.len());
                counts.push((item, 1));
            }
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::check_keywords;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Acme Plumbing | Emergency Plumbing Repairs</title>
  <meta name="description" content="Emergency plumbing repairs and drain cleaning.">
</head>
<body>
  <nav><a href="/">Home</a></nav>
  <h1>Emergency Plumbing</h1>
  <h2>Drain Cleaning</h2>
  <p>We fix leaks fast. Emergency plumbing is our specialty.</p>
  <footer>Ignored footer words footer footer footer</footer>
</body>
</html>"#;

    #[tokio::test]
    async fn mock_keywords_are_fixed_and_valid() {
        let url = Url::parse("https://example.com").unwrap();
        let keywords = MockKeywordSource.extract_keywords(&url).await.unwrap();
        assert_eq!(keywords.len(), 8);
        assert_eq!(keywords[0].keyword, "business services");
        assert!(keywords
            .iter()
            .all(|k| (1_000..=30_000).contains(&k.search_volume)));
        assert!(check_keywords(&keywords).is_ok());
    }

    #[test]
    fn visible_text_skips_chrome() {
        let text = visible_text(PAGE);
        assert!(text.contains("Acme Plumbing"));
        assert!(text.contains("drain cleaning."));
        assert!(text.contains("Drain Cleaning"));
        assert!(!text.contains("footer"));
        assert!(!text.contains("Home"));
    }

    #[test]
    fn paragraphs_are_limited() {
        let mut html = String::from("<html><body>");
        for i in 0..12 {
            html.push_str(&format!("<p>para{i}</p>"));
        }
        html.push_str("</body></html>");
        let text = visible_text(&html);
        assert!(text.contains("para9"));
        assert!(!text.contains("para10"));
    }

    #[test]
    fn rank_terms_filters_stop_words_and_short_words() {
        let ranked = rank_terms("The SEO of it: seo, SEO and an ok audit!");
        let terms: Vec<&str> = ranked.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(ranked[0], ("seo".to_string(), 3));
        assert!(!terms.contains(&"the"));
        assert!(!terms.contains(&"ok"));
        assert!(terms.contains(&"audit"));
        assert!(terms.contains(&"seo seo"));
    }

    #[test]
    fn rank_terms_orders_by_frequency() {
        let ranked = rank_terms(&visible_text(PAGE));
        assert_eq!(ranked[0].0, "plumbing");
        assert_eq!(ranked[1].0, "emergency");
        assert_eq!(ranked[2].0, "emergency plumbing");
        for pair in ranked.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[tokio::test]
    async fn html_source_extracts_from_served_page() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(PAGE)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let source = HtmlKeywordSource::new("SEO-Compass-Test", 5).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let keywords = source.extract_keywords(&url).await.unwrap();

        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords[0].keyword, "plumbing");
        assert!(check_keywords(&keywords).is_ok());

        let again = source.extract_keywords(&url).await.unwrap();
        assert_eq!(keywords, again);
    }

    #[tokio::test]
    async fn html_source_caps_body_size() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string(PAGE.repeat(4))
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let source = HtmlKeywordSource::new("SEO-Compass-Test", 5)
            .unwrap()
            .with_max_page_size(PAGE.len());
        let url = Url::parse(&server.uri()).unwrap();
        let err = source.extract_keywords(&url).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::Adapter(_)));
        assert!(err.to_string().contains("too large"));

        let roomy = HtmlKeywordSource::new("SEO-Compass-Test", 5)
            .unwrap()
            .with_max_page_size(PAGE.len() * 4);
        assert!(roomy.extract_keywords(&url).await.is_ok());
    }

    #[tokio::test]
    async fn html_source_reports_http_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HtmlKeywordSource::new("SEO-Compass-Test", 5).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = source.extract_keywords(&url).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::Adapter(_)));
    }
}
