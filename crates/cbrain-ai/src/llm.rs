//! Language-model client for an Anthropic Messages-compatible API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::retry::retry_with_backoff;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PROVIDER: &str = "language model";

/// A single-turn text completion provider.
///
/// Callers treat the returned text as untrusted: it may be fenced, truncated
/// or off-schema.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AiError`] if the provider call fails after retries.
    async fn complete(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, AiError>;
}

/// Client for `POST /v1/messages`.
///
/// Use [`AnthropicClient::new`] for production or
/// [`AnthropicClient::with_base_url`] to point at a mock server in tests.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    /// # Errors
    ///
    /// Returns [`AiError::Config`] if `api_key` is blank, or [`AiError::Http`]
    /// if the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, AiError> {
        Self::with_base_url(api_key, timeout_secs, max_retries, backoff_base_ms, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`AiError::Config`] if `api_key` is blank, or [`AiError::Http`]
    /// if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
        base_url: &str,
    ) -> Result<Self, AiError> {
        if api_key.trim().is_empty() {
            return Err(AiError::Config("language model API key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            max_retries,
            backoff_base_ms,
        })
    }

    async fn send_once(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, AiError> {
        let request = MessagesRequest {
            model,
            max_tokens,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: MessagesResponse =
            serde_json::from_str(&body).map_err(|source| AiError::Deserialize {
                context: "messages response".to_string(),
                source,
            })?;

        if parsed.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(model, max_tokens, "completion truncated at max_tokens");
        }

        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(AiError::InvalidResponse {
                provider: PROVIDER,
                reason: "no text content".to_string(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String, AiError> {
        retry_with_backoff(PROVIDER, self.max_retries, self.backoff_base_ms, || {
            self.send_once(prompt, model, max_tokens)
        })
        .await
    }
}
