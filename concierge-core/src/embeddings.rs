//! Embeddings module — query/document embeddings for retrieval
//!
//! Provides an `EmbeddingBackend` trait and the Gemini implementation used by
//! the answer path (query task type) and by the admin reindex (document task
//! type). Retries are the client's concern; callers treat any error as
//! "retrieval unavailable" and continue without context.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config;

/// Default Gemini embedding dimensions
pub const GEMINI_DIMENSIONS: usize = 768;

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// EmbeddingBackend trait
// ============================================================================

/// Abstraction over embedding providers.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a document for storage in the vector index.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a search query. Backends that support task-type hints (e.g. Gemini)
    /// override this to use `RETRIEVAL_QUERY` instead of `RETRIEVAL_DOCUMENT`.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }

    /// Cheap reachability check for `/health`.
    async fn health(&self) -> Result<String, EmbeddingError> {
        Ok(self.name().to_string())
    }

    /// Returns the embedding dimension (e.g., 768).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Gemini task hint: pages are indexed as documents, questions embedded as queries.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("Missing embedding in response")]
    MissingEmbedding,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config types
// ============================================================================

/// Gemini embedding client configuration
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingConfig {
    pub api_key: String,
    pub model: String,
    pub dimensions: usize,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl GeminiEmbeddingConfig {
    /// Build from the `[embedding]` section; the key falls back to `GEMINI_API_KEY`.
    pub fn new(api_key: Option<String>, section: &config::EmbeddingConfig) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: section.model.clone(),
            dimensions: section.dimensions as usize,
            max_retries: section.max_retries,
            retry_delay_ms: section.retry_delay_ms,
            timeout_seconds: section.timeout_seconds,
        }
    }
}

// ============================================================================
// Wire format (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: TaskType,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: u16,
    message: String,
}

/// Extract `(code, message)` from a non-2xx Gemini response body.
pub(crate) fn parse_api_error(status: reqwest::StatusCode, body: String) -> (u16, String) {
    serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| (e.code, e.message))
        .unwrap_or((status.as_u16(), body))
}

/// Rate limits, server errors and transport failures are worth another attempt.
fn is_transient(err: &EmbeddingError) -> bool {
    match err {
        EmbeddingError::Http(_) => true,
        EmbeddingError::Api { code, .. } => *code == 429 || *code >= 500,
        _ => false,
    }
}

// ============================================================================
// GeminiEmbeddingClient
// ============================================================================

/// Calls `models/{model}:embedContent` with a task type and a fixed output size.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingClient {
    client: Client,
    config: GeminiEmbeddingConfig,
    base_url: String,
}

impl GeminiEmbeddingClient {
    pub fn new(config: GeminiEmbeddingConfig) -> Result<Self, EmbeddingError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(
        config: GeminiEmbeddingConfig,
        base_url: String,
    ) -> Result<Self, EmbeddingError> {
        if config.api_key.is_empty() {
            return Err(EmbeddingError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// Embed with retries on transient failures only. A dimension mismatch or
    /// a 4xx other than 429 is returned as-is on the first attempt.
    async fn embed_as(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        let backoff = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries.saturating_sub(1));

        match RetryIf::spawn(backoff, || self.request(text, task_type), is_transient).await {
            Ok(values) => Ok(values),
            Err(e) if is_transient(&e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    task = ?task_type,
                    error = %e,
                    "Embedding request kept failing"
                );
                Err(EmbeddingError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn request(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );
        let body = EmbedContentRequest {
            model: format!("models/{}", self.config.model),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type,
            output_dimensionality: self.config.dimensions,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let (code, message) = parse_api_error(status, response.text().await.unwrap_or_default());
            tracing::warn!(code, message = %message, "Gemini embedding API error");
            return Err(EmbeddingError::Api { code, message });
        }

        let values = response
            .json::<EmbedContentResponse>()
            .await?
            .embedding
            .ok_or(EmbeddingError::MissingEmbedding)?
            .values;

        if values.len() != self.config.dimensions {
            return Err(EmbeddingError::InvalidDimensions {
                expected: self.config.dimensions,
                actual: values.len(),
            });
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_as(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_as(text, TaskType::RetrievalQuery).await
    }

    async fn health(&self) -> Result<String, EmbeddingError> {
        let url = format!(
            "{}/models/{}?key={}",
            self.base_url, self.config.model, self.config.api_key
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let (code, message) = parse_api_error(status, response.text().await.unwrap_or_default());
            return Err(EmbeddingError::Api { code, message });
        }
        Ok(format!("{} reachable", self.config.model))
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
