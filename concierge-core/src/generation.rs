//! Text generation — the answer model behind general questions.
//!
//! `GenerationBackend` is the only contract the orchestrator relies on: a
//! system prompt, an optional retrieved context block, the recent history and
//! the new message go in; text comes out.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config;
use crate::embeddings::{parse_api_error, GEMINI_BASE_URL};
use crate::models::session::{Role, Turn};

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

/// Everything the model sees for one turn.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub context: Option<String>,
    pub history: Vec<Turn>,
    pub message: String,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    async fn health(&self) -> Result<String, GenerationError> {
        Ok(self.name().to_string())
    }

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct GeminiGenerationConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

impl GeminiGenerationConfig {
    /// Build from the `[generation]` section; the key falls back to `GEMINI_API_KEY`.
    pub fn new(api_key: Option<String>, section: &config::GenerationConfig) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: section.model.clone(),
            temperature: section.temperature,
            max_output_tokens: section.max_output_tokens,
            max_retries: section.max_retries,
            retry_delay_ms: section.retry_delay_ms,
            timeout_seconds: section.timeout_seconds,
        }
    }
}

// ============================================================================
// Gemini wire format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn content(role: &str, text: impl Into<String>) -> Content {
    Content {
        role: Some(role.to_string()),
        parts: vec![Part { text: text.into() }],
    }
}

fn build_contents(request: &GenerationRequest) -> Vec<Content> {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            content(role, turn.content.clone())
        })
        .collect();

    let message = match &request.context {
        Some(ctx) => format!(
            "Use the following website content to answer.\n\nCONTEXT:\n{}\n\nQUESTION:\n{}",
            ctx, request.message
        ),
        None => request.message.clone(),
    };
    contents.push(content("user", message));
    contents
}

// ============================================================================
// GeminiGenerationClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiGenerationClient {
    client: Client,
    config: GeminiGenerationConfig,
    base_url: String,
}

impl GeminiGenerationClient {
    pub fn new(config: GeminiGenerationConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(
        config: GeminiGenerationConfig,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
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

    async fn generate_once(&self, body: &GenerateRequest) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let (code, message) = parse_api_error(status, response.text().await.unwrap_or_default());
            tracing::error!(code = code, message = %message, "Gemini generation API error");
            return Err(GenerationError::Api { code, message });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.system_prompt.clone(),
                }],
            },
            contents: build_contents(request),
            generation_config: WireGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::spawn(retry_strategy, || self.generate_once(&body)).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All generation retry attempts failed"
                );
                Err(GenerationError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn health(&self) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}?key={}",
            self.base_url, self.config.model, self.config.api_key
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let (code, message) = parse_api_error(status, response.text().await.unwrap_or_default());
            return Err(GenerationError::Api { code, message });
        }
        Ok(format!("{} reachable", self.config.model))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
