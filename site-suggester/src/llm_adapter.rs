use crate::config::LlmConfig;
use crate::topics::Topic;
use crate::traits::TextGenerator;
use crate::types::{ExistingPost, Result, SiteReport, SuggesterError};
use crate::utils::text::truncate_chars;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MAX_DIGEST_POSTS: usize = 30;
const MAX_DIGEST_TITLE_CHARS: usize = 120;

/// Everything the generation service gets to see for one topic.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub topic: Topic,
    pub site: SiteReport,
    pub existing_titles: Vec<String>,
    pub language: String,
    pub date: String,
}

impl GenerationRequest {
    pub fn new(topic: &Topic, site: &SiteReport, posts: &[ExistingPost], language: &str) -> Self {
        let existing_titles = posts
            .iter()
            .take(MAX_DIGEST_POSTS)
            .map(|p| truncate_chars(&p.title, MAX_DIGEST_TITLE_CHARS))
            .collect();

        Self {
            topic: topic.clone(),
            site: site.clone(),
            existing_titles,
            language: language.to_string(),
            date: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        }
    }

    pub fn system_prompt(&self) -> String {
        format!(
            "You review a website and propose exactly one concrete, implementable improvement.\n\
             Rules:\n\
             - Write the title and body in {language}.\n\
             - Stay within the assigned focus area.\n\
             - Do not repeat a suggestion that already exists on the discussion board.\n\
             - The body must describe the problem, the proposed fix and the expected result, \
             referring to specific pages where possible.\n\
             - Reply with a single JSON object: {{\"title\": \"...\", \"body\": \"...\"}}. \
             Escape newlines inside strings as \\n.\n\
             - If there is nothing worth suggesting, reply with {{\"title\": \"\", \"body\": \"\"}}.",
            language = self.language
        )
    }

    pub fn user_prompt(&self) -> Result<String> {
        let report = serde_json::to_string_pretty(&self.site)?;
        let digest = if self.existing_titles.is_empty() {
            "(none yet)".to_string()
        } else {
            self.existing_titles
                .iter()
                .map(|t| format!("- {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(format!(
            "Date: {date}\n\n\
             === Focus: {name} ===\n{focus}\n\n\
             === Site report ===\n{report}\n\n\
             === Already on the discussion board ===\n{digest}\n\n\
             Propose one improvement for the focus area above that is not already covered.",
            date = self.date,
            name = self.topic.display_name,
            focus = self.topic.analysis_focus,
        ))
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Generator for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenRouter, a local Ollama, ...).
pub struct OpenAiCompatibleGenerator {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    app_name: Option<String>,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            app_name: None,
        })
    }

    pub fn with_app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Local endpoints run without a key
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| SuggesterError::Config(format!("invalid API key header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(ref name) = self.app_name {
            if let Ok(val) = HeaderValue::from_str(name) {
                headers.insert("X-Title", val);
            }
        }

        Ok(headers)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    fn generator_name(&self) -> String {
        format!("{} via {}", self.model, self.base_url)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(request.system_prompt()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(request.user_prompt()?),
                },
            ],
            temperature: self.temperature,
        };

        debug!(model = %self.model, topic = %request.topic.id, "chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SuggesterError::Generation(format!(
                "{} returned {}: {}",
                url,
                status,
                truncate_chars(&error_text, 500)
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        // Left to the parser, which reads an empty reply as "nothing to suggest"
        if content.trim().is_empty() {
            warn!(model = %self.model, topic = %request.topic.id, "generation service returned an empty reply");
        }

        info!(model = %self.model, reply_length = content.len(), "generation reply received");
        Ok(content)
    }
}

/// Replays canned replies in order, for dry runs and tests.
///
/// Once the script runs out it answers with a well-formed suggestion built
/// from the requested topic.
pub struct ScriptedGenerator {
    name: String,
    replies: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.with_result(Ok(reply.into()))
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.with_result(Err(SuggesterError::Generation(message.to_string())))
    }

    fn with_result(mut self, result: Result<String>) -> Self {
        self.replies.get_mut().push_back(result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn topic_reply(request: &GenerationRequest) -> String {
        serde_json::json!({
            "title": format!("{}: improvement proposal", request.topic.display_name),
            "body": format!(
                "{}\n\nReviewed page: {} ({} words).",
                request.topic.analysis_focus, request.site.homepage.url, request.site.homepage.word_count
            ),
        })
        .to_string()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn generator_name(&self) -> String {
        format!("Scripted generator ({})", self.name)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None => Ok(Self::topic_reply(request)),
        }
    }
}
