use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

const ALERT_PERSONA: &str = "You are an application security engineer reviewing findings from an \
automated web application scan. Explain the finding below for the developer who owns the code: \
what the issue is, how it could be exploited in this application, and the concrete fix. \
Be concise and answer in Markdown.";

const AGGREGATE_PERSONA: &str = "You are an application security engineer writing the summary \
of an automated web application scan for a pull request review. Using the statistics and \
per-alert notes below, give an overall risk assessment and list the most important fixes first. \
Answer in Markdown, in under 300 words.";

/// Which call site a summarization request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    Alert,
    Aggregate,
}

/// Natural-language summarization collaborator.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, GatewayError>;
}

/// Stand-in used when no summarization backend is configured.
pub struct UnconfiguredSummarizer;

#[async_trait]
impl Summarizer for UnconfiguredSummarizer {
    async fn summarize(&self, _kind: SummaryKind, _text: &str) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Replaces the per-alert persona when set.
    pub alert_prompt: Option<String>,
    /// Replaces the aggregate persona when set.
    pub summary_prompt: Option<String>,
    pub timeout: u64,
}

impl SummarizerSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            alert_prompt: None,
            summary_prompt: None,
            timeout: 120,
        }
    }

    fn persona(&self, kind: SummaryKind) -> &str {
        let custom = match kind {
            SummaryKind::Alert => self.alert_prompt.as_deref(),
            SummaryKind::Aggregate => self.summary_prompt.as_deref(),
        };
        match custom.filter(|p| !p.trim().is_empty()) {
            Some(prompt) => prompt,
            None => match kind {
                SummaryKind::Alert => ALERT_PERSONA,
                SummaryKind::Aggregate => AGGREGATE_PERSONA,
            },
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiSummarizer {
    inner: Client,
    settings: SummarizerSettings,
}

impl OpenAiSummarizer {
    pub fn new(settings: SummarizerSettings) -> Result<Self, GatewayError> {
        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(settings.timeout))
            .build()?;
        Ok(Self { inner, settings })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, kind: SummaryKind, text: &str) -> Result<String, GatewayError> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage { role: "system", content: self.settings.persona(kind) },
                ChatMessage { role: "user", content: text },
            ],
            temperature: 0.2,
        };
        debug!("Requesting {:?} summary ({} chars)", kind, text.len());

        let response = self
            .inner
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::Malformed("no completion content".to_string()))
    }
}
