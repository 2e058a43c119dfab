use crate::config::GeminiConfig;
use crate::models::chat::ChatMessage;
use crate::services::{ChatProvider, EmbeddingProvider};
use crate::utils::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini client speaking the OpenAI-compatible REST surface.
///
/// Every call retries on quota pressure (HTTP 429, or a body mentioning
/// "quota" / "RESOURCE_EXHAUSTED") with exponential backoff. Any other
/// upstream failure fails fast.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Backoff parameters for one call site. Single calls back off gently over
/// many attempts; batch calls back off harder over fewer.
struct RetryPlan {
    max_attempts: usize,
    base_delay: f64,
    max_delay: f64,
    factor: f64,
}

impl RetryPlan {
    fn delay_for(&self, attempt: usize) -> Duration {
        let secs = (self.base_delay * self.factor.powi(attempt as i32)).min(self.max_delay);
        Duration::from_secs_f64(secs)
    }
}

fn is_quota_error(status: reqwest::StatusCode, body: &str) -> bool {
    status.as_u16() == 429 || body.contains("quota") || body.contains("RESOURCE_EXHAUSTED")
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn single_plan(&self) -> RetryPlan {
        let retry = &self.config.retry;
        RetryPlan {
            max_attempts: retry.max_attempts,
            base_delay: retry.base_delay_seconds,
            max_delay: retry.max_delay_seconds,
            factor: 1.5,
        }
    }

    fn batch_plan(&self) -> RetryPlan {
        let retry = &self.config.retry;
        RetryPlan {
            max_attempts: retry.batch_max_attempts,
            base_delay: retry.base_delay_seconds,
            max_delay: retry.max_delay_seconds,
            factor: 2.0,
        }
    }

    /// POST `body` to `path`, retrying per `plan` on quota errors only.
    async fn post_with_retry<B, R>(
        &self,
        path: &str,
        body: &B,
        plan: &RetryPlan,
    ) -> Result<R, ApiError>
    where
        B: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);

        for attempt in 0..plan.max_attempts {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.config.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await
                .map_err(|e| ApiError::UpstreamUnavailable(format!("Gemini network error: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return response.json::<R>().await.map_err(|e| {
                    ApiError::UpstreamUnavailable(format!("Failed to parse Gemini response: {}", e))
                });
            }

            let text = response.text().await.unwrap_or_default();
            if !is_quota_error(status, &text) {
                return Err(ApiError::UpstreamUnavailable(format!(
                    "Gemini API error ({}): {}",
                    status, text
                )));
            }

            if attempt + 1 < plan.max_attempts {
                let delay = plan.delay_for(attempt);
                warn!(
                    "Gemini quota hit ({}), retrying in {:.1}s (attempt {}/{})",
                    status,
                    delay.as_secs_f64(),
                    attempt + 1,
                    plan.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(ApiError::UpstreamExhausted(format!(
            "Gemini quota retries exhausted after {} attempts",
            plan.max_attempts
        )))
    }

    async fn embed_inputs(
        &self,
        inputs: &[String],
        plan: &RetryPlan,
    ) -> Result<Vec<Vec<f32>>, ApiError> {
        let request = EmbeddingRequest {
            input: inputs,
            model: &self.config.embedding_model,
        };

        let body: EmbeddingResponse = self.post_with_retry("/embeddings", &request, plan).await?;

        if body.data.len() != inputs.len() {
            return Err(ApiError::UpstreamUnavailable(format!(
                "Gemini returned {} embeddings for {} inputs",
                body.data.len(),
                inputs.len()
            )));
        }

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let inputs = [text.to_string()];
        let mut vectors = self.embed_inputs(&inputs, &self.single_plan()).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::UpstreamUnavailable("Gemini returned no embedding".to_string()))
    }

    /// Embeds in sub-batches of `retry.batch_size`, pausing between batches
    /// to stay under the provider's rate limits.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let batch_size = self.config.retry.batch_size.max(1);
        let inter_batch = Duration::from_secs(self.config.retry.inter_batch_delay_seconds);
        let plan = self.batch_plan();

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(batch_size).enumerate() {
            if i > 0 && !inter_batch.is_zero() {
                tokio::time::sleep(inter_batch).await;
            }
            debug!(
                "Embedding batch {} ({} texts of {})",
                i + 1,
                batch.len(),
                texts.len()
            );
            vectors.extend(self.embed_inputs(batch, &plan).await?);
        }

        Ok(vectors)
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, ApiError> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let body: ChatResponse = self
            .post_with_retry("/chat/completions", &request, &self.single_plan())
            .await?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                ApiError::UpstreamUnavailable("Gemini returned no completion choices".to_string())
            })
    }
}
