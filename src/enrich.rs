//! Optional relationship analysis of contacts through an LLM.
//!
//! The aggregation core never depends on this module. Enrichment reads
//! finalized contacts and produces a separate annotated view.

use std::cmp::Ordering;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EnrichmentConfig, EnrichmentProvider};
use crate::error::{ContactError, Result};
use crate::export::report::categorize;
use crate::model::contact::Contact;

/// Maximum interaction samples included in a prompt.
const PROMPT_SAMPLES: usize = 5;

/// Characters of each interaction excerpt included in a prompt.
const PROMPT_EXCERPT_CHARS: usize = 200;

const SYSTEM_PROMPT: &str = "You are an expert at analyzing professional relationships and email communications. Always respond with valid JSON.";

/// Structured relationship analysis for one contact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrichment {
    pub relationship_type: String,
    pub engagement_level: String,
    pub key_topics: Vec<String>,
    pub relationship_description: String,
    pub handover_priority: String,
    pub suggested_next_steps: String,
}

impl Enrichment {
    pub fn is_high_priority(&self) -> bool {
        self.priority_rank() == 0
    }

    fn priority_rank(&self) -> u8 {
        level_rank(&self.handover_priority)
    }

    fn engagement_rank(&self) -> u8 {
        level_rank(&self.engagement_level)
    }
}

/// High → 0, Medium → 1, Low → 2, anything else → 3.
fn level_rank(level: &str) -> u8 {
    let level = level.trim().to_lowercase();
    if level.starts_with("high") {
        0
    } else if level.starts_with("medium") {
        1
    } else if level.starts_with("low") {
        2
    } else {
        3
    }
}

/// A contact paired with its analysis, or the reason there is none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedContact {
    pub contact: Contact,
    pub enrichment: Option<Enrichment>,
    pub error: Option<String>,
}

/// A provider that can analyze one contact at a time.
pub trait Enricher {
    /// Short provider name for logs and error messages.
    fn name(&self) -> &str;

    fn enrich(&self, contact: &Contact) -> Result<Enrichment>;
}

/// Analyze up to `max` contacts (all when `None`) in the given order.
///
/// A failure for one contact is recorded on that contact and never aborts
/// the batch. The result is ordered by handover priority, then engagement,
/// then interaction count.
pub fn enrich_contacts<E: Enricher + ?Sized>(
    enricher: &E,
    contacts: &[Contact],
    max: Option<usize>,
    mut on_progress: impl FnMut(usize),
) -> Vec<EnrichedContact> {
    let limit = max.unwrap_or(contacts.len()).min(contacts.len());
    let mut enriched: Vec<EnrichedContact> = contacts[..limit]
        .iter()
        .enumerate()
        .map(|(i, contact)| {
            let result = enricher.enrich(contact);
            on_progress(i + 1);
            match result {
                Ok(enrichment) => EnrichedContact {
                    contact: contact.clone(),
                    enrichment: Some(enrichment),
                    error: None,
                },
                Err(e) => {
                    warn!(email = %contact.email, provider = enricher.name(), error = %e, "Enrichment failed");
                    EnrichedContact {
                        contact: contact.clone(),
                        enrichment: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    enriched.sort_by(compare_enriched);
    enriched
}

fn compare_enriched(a: &EnrichedContact, b: &EnrichedContact) -> Ordering {
    let ranks = |e: &EnrichedContact| {
        e.enrichment
            .as_ref()
            .map(|x| (x.priority_rank(), x.engagement_rank()))
            .unwrap_or((4, 4))
    };
    ranks(a)
        .cmp(&ranks(b))
        .then_with(|| b.contact.interaction_count.cmp(&a.contact.interaction_count))
}

/// Build the analysis prompt for one contact.
pub fn build_prompt(contact: &Contact, personal_domains: &[String]) -> String {
    let mut samples: Vec<String> = contact
        .interactions()
        .iter()
        .rev()
        .take(PROMPT_SAMPLES)
        .map(|i| {
            let date = i
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let excerpt: String = i.excerpt.chars().take(PROMPT_EXCERPT_CHARS).collect();
            format!("Date: {date}\nSubject: {}\nContent: {excerpt}", i.subject)
        })
        .collect();
    if samples.is_empty() {
        samples.push("No email context available".to_string());
    }

    let fmt_date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    format!(
        "Analyze this contact's relationship with our organization based on email interactions:

CONTACT INFORMATION:
Name: {name}
Email: {email}
Organization: {org}
Domain: {domain}
Organization Category: {category}
Total Interactions: {count}
First Contact: {first}
Last Contact: {last}
Recent Email Subjects: {subjects}

EMAIL INTERACTIONS:
{samples}

Please provide a structured analysis with the following information:

1. RELATIONSHIP_TYPE: (Choose one: Government Official, Academic/Researcher, NGO Representative, Industry Contact, Media, Other)
2. ENGAGEMENT_LEVEL: (Choose one: High, Medium, Low)
3. KEY_TOPICS: List 2-3 main topics of discussion
4. RELATIONSHIP_DESCRIPTION: 2-3 sentence description of this person's role and relationship with us
5. HANDOVER_PRIORITY: (Choose one: High, Medium, Low)
6. SUGGESTED_NEXT_STEPS: Brief suggestion for how a successor should approach this relationship

Format your response as JSON with these exact keys:
{{\"relationship_type\": \"\", \"engagement_level\": \"\", \"key_topics\": [], \"relationship_description\": \"\", \"handover_priority\": \"\", \"suggested_next_steps\": \"\"}}
",
        name = contact.label(),
        email = contact.email,
        org = contact.organization.as_deref().unwrap_or("Unknown"),
        domain = contact.domain,
        category = categorize(contact, personal_domains),
        count = contact.interaction_count,
        first = fmt_date(contact.first_seen),
        last = fmt_date(contact.last_seen),
        subjects = contact.sample_subjects.join("; "),
        samples = samples.join("\n---\n"),
    )
}

/// Find the JSON object in a model reply.
///
/// Accepts a bare object, a fenced code block, or prose around an object.
pub fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip the language tag line
        let body_start = after.find('\n').map(|p| p + 1).unwrap_or(0);
        let body = &after[body_start..];
        let body = body.find("```").map(|end| &body[..end]).unwrap_or(body).trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Parse a model reply into an [`Enrichment`].
pub fn parse_enrichment(content: &str) -> std::result::Result<Enrichment, String> {
    let json = extract_json(content).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(json).map_err(|e| format!("invalid JSON in response: {e}"))
}

/// The enricher selected by `config.provider`.
pub fn build_enricher(
    config: &EnrichmentConfig,
    personal_domains: Vec<String>,
) -> Result<Box<dyn Enricher>> {
    Ok(match config.provider {
        EnrichmentProvider::OpenAi => {
            Box::new(OpenAiEnricher::from_config(config)?.with_personal_domains(personal_domains))
        }
        EnrichmentProvider::Anthropic => Box::new(
            AnthropicEnricher::from_config(config)?.with_personal_domains(personal_domains),
        ),
    })
}

/// API key from the configured environment variable, if set and non-blank.
fn api_key_from_env(config: &EnrichmentConfig) -> Option<String> {
    let var = config.api_key_env();
    let key = std::env::var(var).ok().filter(|k| !k.trim().is_empty());
    if key.is_none() {
        warn!(var = %var, "No API key in environment, sending unauthenticated requests");
    }
    key
}

fn http_client(config: &EnrichmentConfig, provider: &str) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ContactError::Enrichment {
            provider: provider.into(),
            reason: e.to_string(),
        })
}

// ── OpenAI-compatible provider ──────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Provider for OpenAI-compatible chat completion APIs
/// (OpenAI, OpenRouter, Ollama, vLLM, LM Studio).
pub struct OpenAiEnricher {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    personal_domains: Vec<String>,
}

impl OpenAiEnricher {
    /// Build from configuration; the API key is read from `api_key_env`.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config, "openai-compatible")?,
            base_url: config.endpoint().trim_end_matches('/').to_string(),
            api_key: api_key_from_env(config),
            model: config.model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            personal_domains: Vec::new(),
        })
    }

    /// Webmail domains, so personal addresses are labelled as such in prompts.
    pub fn with_personal_domains(mut self, domains: Vec<String>) -> Self {
        self.personal_domains = domains;
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    fn failure(&self, reason: impl Into<String>) -> ContactError {
        ContactError::Enrichment {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .map_err(|e| self.failure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiError>()
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(self.failure(format!("API error {}: {message}", status.as_u16())));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| self.failure(format!("failed to parse response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| self.failure("no choices in response"))
    }
}

impl Enricher for OpenAiEnricher {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn enrich(&self, contact: &Contact) -> Result<Enrichment> {
        let prompt = build_prompt(contact, &self.personal_domains);
        debug!(email = %contact.email, model = %self.model, "Requesting enrichment");
        let content = self.complete(&prompt)?;
        parse_enrichment(&content).map_err(|reason| self.failure(reason))
    }
}

// ── Anthropic provider ──────────────────────────────────────────

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

impl AnthropicResponse {
    /// Concatenated text blocks, or `None` when the reply has no text.
    fn text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Provider for the Anthropic Messages API.
pub struct AnthropicEnricher {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    personal_domains: Vec<String>,
}

impl AnthropicEnricher {
    /// Build from configuration; the API key is read from `api_key_env`.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config, "anthropic")?,
            base_url: config.endpoint().trim_end_matches('/').to_string(),
            api_key: api_key_from_env(config),
            model: config.model().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            personal_domains: Vec::new(),
        })
    }

    pub fn with_personal_domains(mut self, domains: Vec<String>) -> Self {
        self.personal_domains = domains;
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        if let Some(ref key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
        }
        headers
    }

    fn failure(&self, reason: impl Into<String>) -> ContactError {
        ContactError::Enrichment {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }

    fn request<'a>(&'a self, prompt: &'a str) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT),
            temperature: Some(self.temperature),
        }
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&self.request(prompt))
            .send()
            .map_err(|e| self.failure(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiError>()
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(self.failure(format!("API error {}: {message}", status.as_u16())));
        }

        let parsed: AnthropicResponse = response
            .json()
            .map_err(|e| self.failure(format!("failed to parse response: {e}")))?;
        parsed
            .text()
            .ok_or_else(|| self.failure("no text content in response"))
    }
}

impl Enricher for AnthropicEnricher {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn enrich(&self, contact: &Contact) -> Result<Enrichment> {
        let prompt = build_prompt(contact, &self.personal_domains);
        debug!(email = %contact.email, model = %self.model, "Requesting enrichment");
        let content = self.complete(&prompt)?;
        parse_enrichment(&content).map_err(|reason| self.failure(reason))
    }
}
