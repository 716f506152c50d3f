//! API-based summarizer using OpenAI-compatible or Anthropic endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{clean_summary, SummarizerError, SummaryClient};

/// Upper bound on page text sent to the provider, in characters.
const MAX_INPUT_CHARS: usize = 12_000;

/// Configuration for API-based summarizer.
#[derive(Debug, Clone)]
pub struct ApiSummarizerConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "gpt-4o-mini", "claude-3-haiku-20240307")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,
}

impl ApiSummarizerConfig {
    /// Create config for OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
        }
    }

    /// Create config for Claude API.
    pub fn claude(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn is_anthropic(&self) -> bool {
        self.base_url.contains("anthropic")
    }
}

/// API-based summarizer implementation.
///
/// One request per call; the caller decides whether to retry.
pub struct ApiSummarizer {
    client: Client,
    config: ApiSummarizerConfig,
}

impl ApiSummarizer {
    /// Create a new API summarizer.
    pub fn new(config: ApiSummarizerConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SummarizerError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Build prompt for page summarization.
    fn build_prompt(&self, raw_text: &str, highlight_excerpts: Option<&[String]>) -> String {
        let text: String = raw_text.chars().take(MAX_INPUT_CHARS).collect();
        let highlights = match highlight_excerpts {
            Some(excerpts) if !excerpts.is_empty() => format!(
                "\n\nThe reader highlighted these passages:\n- {}",
                excerpts.join("\n- ")
            ),
            _ => String::new(),
        };

        format!(
            r#"Summarize this book page so it can be found later by a search query.

PAGE TEXT:
{text}{highlights}

Guidelines:
- 2-3 sentences, plain text, no markdown
- Name the concrete topics, techniques and terms the page covers
- Give weight to highlighted passages when present"#
        )
    }

    async fn make_request(&self, prompt: &str) -> Result<String, SummarizerError> {
        if self.config.is_anthropic() {
            self.make_anthropic_request(prompt).await
        } else {
            self.make_openai_request(prompt).await
        }
    }

    /// Make OpenAI-compatible API request.
    async fn make_openai_request(&self, prompt: &str) -> Result<String, SummarizerError> {
        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            model: &'a str,
            messages: Vec<OpenAIMessage<'a>>,
        }

        #[derive(Serialize)]
        struct OpenAIMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            choices: Vec<OpenAIChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAIChoice {
            message: OpenAIMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAIMessageResponse {
            #[serde(default)]
            content: Option<String>,
        }

        let request = OpenAIRequest {
            model: &self.config.model,
            messages: vec![OpenAIMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;

        let response = check_status(response).await?;
        let body: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Unavailable(format!("Malformed response: {}", e)))?;

        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// Make Anthropic API request.
    async fn make_anthropic_request(&self, prompt: &str) -> Result<String, SummarizerError> {
        #[derive(Serialize)]
        struct AnthropicRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<AnthropicMessage<'a>>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            #[serde(default)]
            text: String,
        }

        let request = AnthropicRequest {
            model: &self.config.model,
            max_tokens: 300,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let url = format!("{}/messages", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizerError::Unavailable(e.to_string()))?;

        let response = check_status(response).await?;
        let body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Unavailable(format!("Malformed response: {}", e)))?;

        Ok(body
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

/// Map throttling and non-success statuses to errors.
async fn check_status(response: Response) -> Result<Response, SummarizerError> {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SummarizerError::RateLimited { retry_after });
    }

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(SummarizerError::Unavailable(format!(
            "HTTP {}: {}",
            status, body
        )));
    }

    Ok(response)
}

#[async_trait]
impl SummaryClient for ApiSummarizer {
    async fn summarize(
        &self,
        raw_text: &str,
        highlight_excerpts: Option<&[String]>,
    ) -> Result<String, SummarizerError> {
        if raw_text.trim().is_empty() {
            return Err(SummarizerError::EmptyResponse);
        }

        let prompt = self.build_prompt(raw_text, highlight_excerpts);
        debug!(model = %self.config.model, chars = raw_text.len(), "Calling summarization API");
        let reply = self.make_request(&prompt).await?;
        clean_summary(&reply).ok_or(SummarizerError::EmptyResponse)
    }
}
