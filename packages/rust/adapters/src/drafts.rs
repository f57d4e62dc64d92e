//! Content drafts: an OpenAI-compatible chat completion writer and markdown templates.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use seocompass_shared::{Keyword, PageDraft, PageName, Result, SeoCompassError};

use crate::{DraftWriter, USER_AGENT, build_client, normalize_base_url};

/// Keywords fed to templates and prompts.
const TOP_KEYWORDS: usize = 5;

fn top_keywords(keywords: &[Keyword]) -> Vec<&str> {
    keywords
        .iter()
        .take(TOP_KEYWORDS)
        .map(|k| k.keyword.as_str())
        .collect()
}

/// `"seo optimization"` -> `"Seo Optimization"`.
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Mock
// ---------------------------------------------------------------------------

/// Markdown templates seeded with the top keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockDraftWriter;

#[async_trait]
impl DraftWriter for MockDraftWriter {
    fn name(&self) -> &str {
        "mock-drafts"
    }

    async fn generate_drafts(&self, keywords: &[Keyword]) -> Result<Vec<PageDraft>> {
        let top = top_keywords(keywords);
        Ok(PageName::ALL
            .iter()
            .map(|&page_name| PageDraft {
                page_name,
                content: match page_name {
                    PageName::Home => home_template(&top),
                    PageName::Services => services_template(&top),
                    PageName::About => about_template(&top),
                },
            })
            .collect())
    }
}

fn home_template(keywords: &[&str]) -> String {
    let primary = keywords.first().copied().unwrap_or("professional services");
    let title = title_case(primary);
    format!(
        "# Welcome to Your {title} Solution\n\
         \n\
         ## Transform Your Business with Expert {primary}\n\
         \n\
         We specialize in delivering exceptional {primary} that drive real results for \
         businesses like yours. Our approach combines industry expertise with innovative \
         strategies to help you achieve your goals.\n\
         \n\
         ### Why Choose Our {primary}?\n\
         \n\
         - **Proven Track Record**: Years of experience delivering successful outcomes\n\
         - **Customized Solutions**: Tailored approaches that fit your unique needs\n\
         - **Expert Team**: Skilled professionals dedicated to your success\n\
         - **Results-Driven**: Focus on measurable outcomes and ROI\n\
         \n\
         **Ready to get started?** Contact us today to learn how our {primary} can \
         transform your business.\n"
    )
}

fn services_template(keywords: &[&str]) -> String {
    let services: Vec<&str> = if keywords.len() >= 4 {
        keywords[..4].to_vec()
    } else {
        keywords
            .iter()
            .copied()
            .chain(["consulting", "strategy", "optimization"])
            .collect()
    };

    let mut content = String::from(
        "# Our Professional Services\n\n\
         We offer a comprehensive range of services designed to help your business succeed:\n\n",
    );
    for (i, service) in services.iter().enumerate() {
        content.push_str(&format!(
            "## {}. {}\n\n\
             Our {service} solutions are designed to deliver measurable results, combining \
             industry best practices with innovative approaches.\n\n\
             **Key Benefits:**\n\
             - Enhanced performance and efficiency\n\
             - Measurable ROI and results\n\
             - Expert guidance and support\n\n",
            i + 1,
            title_case(service)
        ));
    }
    content.push_str(
        "### Get Started Today\n\n\
         Ready to transform your business? Contact us to discuss how our services can help.\n",
    );
    content
}

fn about_template(keywords: &[&str]) -> String {
    let focus = keywords.first().copied().unwrap_or("business solutions");
    let title = title_case(focus);
    format!(
        "# About Our Company\n\
         \n\
         ## Your Trusted Partner in {title}\n\
         \n\
         Founded with a mission to help businesses thrive, we have established ourselves \
         as a leading provider of {focus} and related services.\n\
         \n\
         ### Our Mission\n\
         \n\
         To empower businesses with the tools, strategies and expertise they need to \
         succeed, delivering exceptional value through our {focus}.\n\
         \n\
         ### Our Values\n\
         \n\
         - **Excellence**: The highest standards in everything we do\n\
         - **Integrity**: Honesty and transparency with every client\n\
         - **Results**: Measurable outcomes for our clients\n\
         \n\
         **Ready to learn more?** Contact us today.\n"
    )
}

// ---------------------------------------------------------------------------
// LLM (OpenAI-compatible chat completions)
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are an SEO copywriter. Write concise, well-structured \
                             Markdown page drafts that use the given keywords naturally.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Drafts from an OpenAI-compatible `chat/completions` endpoint, one request per page.
pub struct LlmDraftWriter {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmDraftWriter {
    pub fn new(base_url: &str, api_key: String, model: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(USER_AGENT, timeout_secs)?,
            base_url: normalize_base_url(base_url)?,
            api_key,
            model: model.to_string(),
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeoCompassError::Adapter(format!(
                "{endpoint}: HTTP {status}"
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SeoCompassError::Adapter(format!("{endpoint}: invalid response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| SeoCompassError::Adapter(format!("{endpoint}: empty completion")))
    }
}

fn page_prompt(page: PageName, keywords: &[&str]) -> String {
    let focus = match page {
        PageName::Home => "the home page: headline, value proposition and a call to action",
        PageName::Services => "the services page: one section per service with key benefits",
        PageName::About => "the about page: story, mission and values",
    };
    let keywords = if keywords.is_empty() {
        "professional services".to_string()
    } else {
        keywords.join(", ")
    };
    format!("Write {focus}. Target keywords: {keywords}. Respond with Markdown only.")
}

#[async_trait]
impl DraftWriter for LlmDraftWriter {
    fn name(&self) -> &str {
        "llm"
    }

    #[instrument(skip_all, fields(model = %self.model, keywords = keywords.len()))]
    async fn generate_drafts(&self, keywords: &[Keyword]) -> Result<Vec<PageDraft>> {
        let top = top_keywords(keywords);
        let mut drafts = Vec::with_capacity(PageName::ALL.len());

        for page_name in PageName::ALL {
            let content = self.complete(page_prompt(page_name, &top)).await?;
            debug!(page = %page_name, chars = content.len(), "draft generated");
            drafts.push(PageDraft {
                page_name,
                content,
            });
        }

        info!(count = drafts.len(), "drafts generated");
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::check_drafts;

    fn keywords(terms: &[&str]) -> Vec<Keyword> {
        terms
            .iter()
            .map(|t| Keyword {
                keyword: t.to_string(),
                search_volume: 1_000,
                difficulty: 0.5,
            })
            .collect()
    }

    #[test]
    fn title_case_words() {
        assert_eq!(title_case("seo optimization"), "Seo Optimization");
        assert_eq!(title_case("WEB design"), "Web Design");
    }

    #[tokio::test]
    async fn mock_drafts_use_top_keyword() {
        let kws = keywords(&[
            "seo optimization",
            "digital marketing",
            "web development",
            "content strategy",
            "online presence",
            "brand development",
        ]);
        let drafts = MockDraftWriter.generate_drafts(&kws).await.unwrap();
        assert!(check_drafts(&drafts).is_ok());

        let home = &drafts[0];
        assert_eq!(home.page_name, PageName::Home);
        assert!(home.content.starts_with("# Welcome to Your Seo Optimization Solution"));

        let services = &drafts[1].content;
        assert!(services.contains("## 4. Content Strategy"));
        assert!(!services.contains("## 5."));

        assert!(drafts[2].content.contains("Your Trusted Partner in Seo Optimization"));
    }

    #[tokio::test]
    async fn mock_drafts_without_keywords_use_defaults() {
        let drafts = MockDraftWriter.generate_drafts(&[]).await.unwrap();
        assert!(check_drafts(&drafts).is_ok());
        assert!(drafts[0].content.contains("Professional Services Solution"));
        assert!(drafts[1].content.contains("## 3. Optimization"));
        assert!(drafts[2].content.contains("Business Solutions"));
    }

    #[tokio::test]
    async fn short_keyword_lists_pad_services() {
        let drafts = MockDraftWriter
            .generate_drafts(&keywords(&["plumbing", "drain cleaning"]))
            .await
            .unwrap();
        let services = &drafts[1].content;
        assert!(services.contains("## 2. Drain Cleaning"));
        assert!(services.contains("## 5. Optimization"));
    }

    #[tokio::test]
    async fn llm_writer_requests_each_page() {
        let server = wiremock::MockServer::start().await;
        let reply = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "# Draft\n\nBody" } }]
        });

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/v1/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer llm-key"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(reply))
            .expect(3)
            .mount(&server)
            .await;

        let writer = LlmDraftWriter::new(
            &format!("{}/v1/", server.uri()),
            "llm-key".into(),
            "test-model",
            5,
        )
        .unwrap();
        let drafts = writer
            .generate_drafts(&keywords(&["seo optimization"]))
            .await
            .unwrap();

        assert!(check_drafts(&drafts).is_ok());
        assert!(drafts.iter().all(|d| d.content == "# Draft\n\nBody"));
        assert_eq!(
            drafts.iter().map(|d| d.page_name).collect::<Vec<_>>(),
            PageName::ALL.to_vec()
        );
    }

    #[tokio::test]
    async fn llm_empty_completion_is_adapter_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let writer = LlmDraftWriter::new(&server.uri(), "k".into(), "m", 5).unwrap();
        let err = writer.generate_drafts(&[]).await.unwrap_err();
        assert!(matches!(err, SeoCompassError::Adapter(_)));
        assert!(err.to_string().contains("empty completion"));
    }

    #[test]
    fn prompts_name_the_page_and_keywords() {
        let prompt = page_prompt(PageName::Services, &["seo", "audit"]);
        assert!(prompt.contains("services page"));
        assert!(prompt.contains("seo, audit"));
    }
}
