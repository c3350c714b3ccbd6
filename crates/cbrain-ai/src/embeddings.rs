//! TEI (Text Embeddings Inference) client for vector generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AiError;
use crate::retry::retry_with_backoff;

/// Maximum number of texts per /embed call.
const BATCH_SIZE: usize = 64;

const PROVIDER: &str = "embeddings";

/// Anything that turns texts into dense vectors, one per input, in order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AiError`] if the provider is unreachable or answers with an
    /// unusable payload.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;
}

/// TEI HTTP client.
pub struct TeiEmbedder {
    client: reqwest::Client,
    url: String,
    max_retries: u32,
    backoff_base_ms: u64,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

impl TeiEmbedder {
    /// Create a client for the TEI server at `tei_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Http`] if the underlying `reqwest::Client` cannot be built.
    pub fn new(
        tei_url: &str,
        timeout_secs: u64,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/embed", tei_url.trim_end_matches('/')),
            max_retries,
            backoff_base_ms,
        })
    }

    async fn embed_chunk(&self, chunk: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let request = EmbedRequest { inputs: chunk };
        let response = self.client.post(&self.url).json(&request).send().await?;

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
        let embeddings: Vec<Vec<f32>> =
            serde_json::from_str(&body).map_err(|source| AiError::Deserialize {
                context: "TEI /embed response".to_string(),
                source,
            })?;

        if embeddings.len() != chunk.len() {
            return Err(AiError::InvalidResponse {
                provider: PROVIDER,
                reason: format!(
                    "{} embeddings for {} inputs",
                    embeddings.len(),
                    chunk.len()
                ),
            });
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for TeiEmbedder {
    /// Texts are batched into groups of [`BATCH_SIZE`] per request.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = retry_with_backoff(PROVIDER, self.max_retries, self.backoff_base_ms, || {
                self.embed_chunk(chunk)
            })
            .await?;
            all_embeddings.extend(embeddings);
        }

        tracing::debug!(count = all_embeddings.len(), "embedded texts");
        Ok(all_embeddings)
    }
}
