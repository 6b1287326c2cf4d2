//! Topic Namer
//!
//! Labels a cluster from a sample of its member texts using a generative
//! service. The service gives no structural guarantee, so parsing is
//! defensive and every failure collapses into [`TopicLabel::fallback`].
//! Naming never returns an error.

use crate::config::NamingConfig;
use crate::{SDKError, SDKResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Separator placed between sample texts in the prompt
const SAMPLE_SEPARATOR: &str = "\n---\n";

const MAX_NAME_CHARS: usize = 80;
const MAX_KEYWORDS: usize = 10;

/// Name, description and keywords for a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicLabel {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

impl TopicLabel {
    /// Deterministic label used whenever naming fails
    pub fn fallback() -> Self {
        Self {
            name: "Auto-topic".to_string(),
            description: "Automatically grouped memories".to_string(),
            keywords: Vec::new(),
        }
    }
}

/// Labels clusters of memory texts
#[async_trait]
pub trait TopicNamer: Send + Sync {
    async fn name(&self, samples: &[String]) -> TopicLabel;
}

/// Namer that always returns the fallback label
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackTopicNamer;

#[async_trait]
impl TopicNamer for FallbackTopicNamer {
    async fn name(&self, _samples: &[String]) -> TopicLabel {
        TopicLabel::fallback()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion service
// ─────────────────────────────────────────────────────────────────────────────

/// Generative text service: prompt in, free-form text out
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> SDKResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/v1/chat/completions` client
pub struct HttpCompletionClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            temperature: 0.2,
            max_tokens: 256,
            http_client: reqwest::Client::new(),
        }
    }

    /// Build from naming config; None when naming is disabled or has no base URL
    pub fn from_config(config: &NamingConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let base_url = config.base_url.clone()?;
        let mut client = Self::new(base_url, config.model.clone(), config.api_key.clone());
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        Some(client)
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> SDKResult<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut http_req = self.http_client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            http_req = http_req.bearer_auth(key);
        }

        let response = http_req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SDKError::http(Some(status.as_u16()), body_text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SDKError::naming(format!("failed to parse completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SDKError::naming("no choices in completion response"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generative namer
// ─────────────────────────────────────────────────────────────────────────────

/// Namer backed by a [`CompletionClient`]
pub struct LlmTopicNamer {
    client: Arc<dyn CompletionClient>,
    max_samples: usize,
    timeout: Duration,
}

impl LlmTopicNamer {
    pub fn new(client: Arc<dyn CompletionClient>, config: &NamingConfig) -> Self {
        Self {
            client,
            max_samples: config.max_samples.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn build_prompt(&self, samples: &[&str]) -> String {
        format!(
            "You are labelling a group of related notes from a personal knowledge base.\n\
             Respond with a single JSON object and nothing else, using exactly these fields:\n\
             {{\"name\": \"2-5 word topic name\", \"description\": \"one sentence\", \"keywords\": [\"up to 5 lowercase keywords\"]}}\n\n\
             Notes:\n{}",
            samples.join(SAMPLE_SEPARATOR)
        )
    }
}

#[async_trait]
impl TopicNamer for LlmTopicNamer {
    async fn name(&self, samples: &[String]) -> TopicLabel {
        let picked: Vec<&str> = samples
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .take(self.max_samples)
            .collect();
        if picked.is_empty() {
            return TopicLabel::fallback();
        }

        let prompt = self.build_prompt(&picked);
        let response = match tokio::time::timeout(self.timeout, self.client.complete(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "topic naming call failed, using fallback label");
                return TopicLabel::fallback();
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "topic naming timed out, using fallback label");
                return TopicLabel::fallback();
            }
        };

        match parse_label(&response) {
            Some(label) => {
                debug!(name = %label.name, samples = picked.len(), "cluster named");
                label
            }
            None => {
                warn!(response_len = response.len(), "unparseable topic label, using fallback");
                TopicLabel::fallback()
            }
        }
    }
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Remove a surrounding ``` / ```json fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a service response into a label, or None if it is unusable
pub fn parse_label(response: &str) -> Option<TopicLabel> {
    let body = strip_code_fence(response);
    let raw: RawLabel = serde_json::from_str(body).ok().or_else(|| {
        // Tolerate prose around the object
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        (start < end).then(|| serde_json::from_str(&body[start..=end]).ok()).flatten()
    })?;

    let name: String = raw.name.trim().chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() {
        return None;
    }

    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.keywords {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords.truncate(MAX_KEYWORDS);

    Some(TopicLabel {
        name,
        description: raw.description.trim().to_string(),
        keywords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replies with a canned response and records prompts
    struct CannedClient {
        reply: SDKResult<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedClient {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(&self, prompt: &str) -> SDKResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(SDKError::http(Some(500), "boom")),
            }
        }
    }

    struct SlowClient;

    #[async_trait]
    impl CompletionClient for SlowClient {
        async fn complete(&self, _prompt: &str) -> SDKResult<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("{\"name\": \"Too late\"}".to_string())
        }
    }

    fn samples(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("note number {i}")).collect()
    }

    #[test]
    fn test_parse_plain_json() {
        let label = parse_label(r#"{"name": "Fruit Shopping", "description": "Buying apples", "keywords": ["Apples", "market", "apples"]}"#)
            .unwrap();
        assert_eq!(label.name, "Fruit Shopping");
        assert_eq!(label.keywords, vec!["apples", "market"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let label = parse_label("```json\n{\"name\": \"Weather\", \"keywords\": []}\n```").unwrap();
        assert_eq!(label.name, "Weather");
        assert_eq!(label.description, "");

        let label = parse_label("```\n{\"name\": \"Plain fence\"}\n```").unwrap();
        assert_eq!(label.name, "Plain fence");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_label("Sure! Here is a name: Fruit").is_none());
        assert!(parse_label(r#"{"name": "   "}"#).is_none());
        assert!(parse_label(r#"{"description": "no name"}"#).is_none());
        assert!(parse_label("").is_none());
    }

    #[test]
    fn test_parse_tolerates_surrounding_prose() {
        let label = parse_label("Here you go: {\"name\": \"Travel\"} hope it helps").unwrap();
        assert_eq!(label.name, "Travel");
    }

    #[tokio::test]
    async fn test_llm_namer_caps_samples() {
        let client = Arc::new(CannedClient::ok(r#"{"name": "Numbers"}"#));
        let namer = LlmTopicNamer::new(client.clone(), &NamingConfig::default());

        let label = namer.name(&samples(25)).await;
        assert_eq!(label.name, "Numbers");

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("note number 9"));
        assert!(!prompts[0].contains("note number 10"));
    }

    #[tokio::test]
    async fn test_llm_namer_falls_back() {
        let garbage = Arc::new(CannedClient::ok("not json at all"));
        let namer = LlmTopicNamer::new(garbage, &NamingConfig::default());
        assert_eq!(namer.name(&samples(3)).await, TopicLabel::fallback());

        let failing = Arc::new(CannedClient {
            reply: Err(SDKError::http(Some(500), "boom")),
            prompts: Mutex::new(Vec::new()),
        });
        let namer = LlmTopicNamer::new(failing.clone(), &NamingConfig::default());
        assert_eq!(namer.name(&samples(3)).await, TopicLabel::fallback());

        // Empty input never reaches the service
        assert_eq!(namer.name(&[]).await, TopicLabel::fallback());
        assert_eq!(failing.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_llm_namer_times_out() {
        let namer = LlmTopicNamer::new(Arc::new(SlowClient), &NamingConfig::default());
        assert_eq!(namer.name(&samples(2)).await, TopicLabel::fallback());
    }

    #[tokio::test]
    async fn test_fallback_namer() {
        assert_eq!(FallbackTopicNamer.name(&samples(2)).await.name, "Auto-topic");
    }
}
