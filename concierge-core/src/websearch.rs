//! Web search fallback — SerpAPI Google results for questions the website
//! index cannot answer.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::WebSearchConfig;

const SERPAPI_BASE_URL: &str = "https://serpapi.com";

#[derive(Error, Debug)]
pub enum WebSearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Web search is not configured")]
    NotConfigured,
}

/// One organic result, reduced to what the answer context needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WebResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>, WebSearchError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Clone)]
pub struct SerpApiSearch {
    client: Client,
    base_url: String,
    api_key: String,
    domain: String,
    country: String,
    max_results: u32,
}

impl SerpApiSearch {
    /// The key falls back to `SERPAPI_API_KEY`; without one the search is `NotConfigured`.
    pub fn new(api_key: Option<String>, config: &WebSearchConfig) -> Result<Self, WebSearchError> {
        Self::with_base_url(api_key, config, SERPAPI_BASE_URL.to_string())
    }

    pub fn with_base_url(
        api_key: Option<String>,
        config: &WebSearchConfig,
        base_url: String,
    ) -> Result<Self, WebSearchError> {
        let api_key = api_key
            .or_else(|| std::env::var("SERPAPI_API_KEY").ok())
            .unwrap_or_default();
        if api_key.is_empty() {
            return Err(WebSearchError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            domain: config.domain.clone(),
            country: config.country.clone(),
            max_results: config.max_results,
        })
    }

    fn scoped_query(&self, query: &str) -> String {
        if self.domain.is_empty() {
            query.to_string()
        } else {
            format!("site:{} {}", self.domain, query)
        }
    }
}

#[async_trait]
impl WebSearch for SerpApiSearch {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>, WebSearchError> {
        let q = self.scoped_query(query);
        let num = self.max_results.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("engine", "google"),
                ("q", q.as_str()),
                ("num", num.as_str()),
                ("hl", "en"),
                ("gl", self.country.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SearchResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(body);
            tracing::warn!(code = status.as_u16(), message = %message, "SerpAPI error");
            return Err(WebSearchError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        let results: Vec<WebResult> = parsed
            .organic_results
            .into_iter()
            .filter_map(|r| {
                let link = r.link?;
                let snippet = r.snippet.trim().to_string();
                (!snippet.is_empty()).then(|| WebResult {
                    title: r.title.trim().to_string(),
                    link,
                    snippet,
                })
            })
            .take(self.max_results as usize)
            .collect();
        tracing::debug!(count = results.len(), "Web search complete");
        Ok(results)
    }

    fn name(&self) -> &str {
        "serpapi"
    }
}
