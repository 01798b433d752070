//! Remote embedding service for OpenAI-compatible APIs
//!
//! Talks to any provider exposing `POST {base_url}/embeddings` with the
//! `{input, model}` request shape.

use super::EmbeddingService;
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Embedding dimension of the default model (text-embedding-3-small)
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

const DEFAULT_MODEL: &str = "text-embedding-3-small";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Maximum texts per batch request
const MAX_BATCH_SIZE: usize = 128;

/// Maximum retry attempts for rate limiting
const MAX_RETRIES: usize = 3;

/// Backoff base duration in milliseconds
const BACKOFF_BASE_MS: u64 = 1000;

/// Request timeout duration
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// OpenAI-compatible embedding service
pub struct RemoteEmbeddingService {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

/// API error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl RemoteEmbeddingService {
    /// Create a new remote embedding service
    ///
    /// # Arguments
    /// * `api_key` - Provider API key
    /// * `model` - Model name (defaults to "text-embedding-3-small")
    /// * `base_url` - API base URL (defaults to the OpenAI endpoint)
    /// * `dimensions` - Expected embedding length (defaults to 1536)
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        dimensions: Option<usize>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(MnemoError::Validation("API key cannot be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MnemoError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            dimensions: dimensions.unwrap_or(DEFAULT_EMBEDDING_DIM),
        })
    }

    /// Call the API with retry on rate limiting and timeouts
    async fn call_api_with_retry(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        let mut retries = 0;

        loop {
            match self.call_api(texts).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if retries >= MAX_RETRIES || !is_retryable(&e) {
                        return Err(e);
                    }

                    let backoff_ms = BACKOFF_BASE_MS * 2_u64.pow(retries as u32);
                    warn!(
                        "Embedding API call failed, retrying after {}ms (attempt {}/{})",
                        backoff_ms,
                        retries + 1,
                        MAX_RETRIES
                    );

                    sleep(Duration::from_millis(backoff_ms)).await;
                    retries += 1;
                }
            }
        }
    }

    /// Call the API once (no retry)
    async fn call_api(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        debug!(
            "Calling embedding API: {} texts, model: {}",
            texts.len(),
            self.model
        );

        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| MnemoError::Network(e.to_string()))?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let parsed = response
                    .json::<EmbeddingResponse>()
                    .await
                    .map_err(|e| MnemoError::Embedding(format!("Malformed response: {}", e)))?;

                debug!(
                    "Generated {} embeddings ({} tokens)",
                    parsed.data.len(),
                    parsed.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
                );

                Ok(parsed)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MnemoError::Authentication(
                "Invalid or missing API key".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(MnemoError::RateLimitExceeded(
                "Embedding provider rate limit exceeded".to_string(),
            )),
            StatusCode::BAD_REQUEST => {
                let error_msg = match response.json::<ErrorResponse>().await {
                    Ok(body) => body
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "Bad request".to_string()),
                    Err(_) => "Bad request".to_string(),
                };

                Err(MnemoError::Embedding(error_msg))
            }
            _ => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                Err(MnemoError::Embedding(format!(
                    "API error (status {}): {}",
                    status, error_text
                )))
            }
        }
    }

    fn validate_text(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(MnemoError::Embedding("Text cannot be empty".to_string()));
        }
        Ok(())
    }

    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(MnemoError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }

        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(MnemoError::Embedding(
                "Embedding contains invalid values (NaN or Inf)".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_retryable(err: &MnemoError) -> bool {
    match err {
        MnemoError::RateLimitExceeded(_) => true,
        MnemoError::Network(msg) => msg.contains("timed out") || msg.contains("timeout"),
        _ => false,
    }
}

#[async_trait]
impl EmbeddingService for RemoteEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.validate_text(text)?;

        let response = self.call_api_with_retry(&[text.to_string()]).await?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| MnemoError::Embedding("Empty response from API".to_string()))?
            .embedding;

        self.validate_embedding(&embedding)?;

        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        for text in texts {
            self.validate_text(text)?;
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            let text_strings: Vec<String> = chunk.iter().map(|s| s.to_string()).collect();
            let response = self.call_api_with_retry(&text_strings).await?;

            let mut embeddings = response.data;
            embeddings.sort_by_key(|e| e.index);

            if embeddings.len() != chunk.len() {
                return Err(MnemoError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }

            for embedding_data in embeddings {
                self.validate_embedding(&embedding_data.embedding)?;
                all_embeddings.push(embedding_data.embedding);
            }
        }

        Ok(all_embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
