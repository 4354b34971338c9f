//! Contact details source — a Google Sheets range of `[label, value]` rows.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ContactsConfig;
use crate::models::contact::ContactEntry;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Contact source is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ContactEntry>, ContactError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Reads contacts from a spreadsheet through the Sheets values API.
#[derive(Debug, Clone)]
pub struct GoogleSheetContacts {
    client: Client,
    base_url: String,
    api_key: String,
    sheet_id: String,
    range: String,
    header_row: bool,
}

impl GoogleSheetContacts {
    /// The key falls back to `GOOGLE_SHEETS_API_KEY`.
    pub fn new(api_key: Option<String>, config: &ContactsConfig) -> Result<Self, ContactError> {
        Self::with_base_url(api_key, config, SHEETS_BASE_URL.to_string())
    }

    pub fn with_base_url(
        api_key: Option<String>,
        config: &ContactsConfig,
        base_url: String,
    ) -> Result<Self, ContactError> {
        let api_key = api_key
            .or_else(|| std::env::var("GOOGLE_SHEETS_API_KEY").ok())
            .unwrap_or_default();
        if config.sheet_id.is_empty() || api_key.is_empty() {
            return Err(ContactError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            sheet_id: config.sheet_id.clone(),
            range: config.sheet_range.clone(),
            header_row: config.header_row,
        })
    }
}

/// Rows with fewer than two cells or a blank label are skipped.
fn rows_to_entries(rows: Vec<Vec<String>>, header_row: bool) -> Vec<ContactEntry> {
    rows.into_iter()
        .skip(usize::from(header_row))
        .filter_map(|row| {
            let mut cells = row.into_iter();
            let label = cells.next()?.trim().to_string();
            let value = cells.next()?.trim().to_string();
            (!label.is_empty() && !value.is_empty()).then(|| ContactEntry::new(label, value))
        })
        .collect()
}

#[async_trait]
impl ContactSource for GoogleSheetContacts {
    async fn fetch(&self) -> Result<Vec<ContactEntry>, ContactError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url, self.sheet_id, self.range
        );
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), "Sheets API error");
            return Err(ContactError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let range: ValueRange = response.json().await?;
        let entries = rows_to_entries(range.values, self.header_row);
        tracing::debug!(count = entries.len(), "Fetched contact rows");
        Ok(entries)
    }

    fn name(&self) -> &str {
        "google_sheets"
    }
}

/// Serves a fixed list; used when no spreadsheet is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticContacts {
    entries: Vec<ContactEntry>,
}

impl StaticContacts {
    pub fn new(entries: Vec<ContactEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl ContactSource for StaticContacts {
    async fn fetch(&self) -> Result<Vec<ContactEntry>, ContactError> {
        Ok(self.entries.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}
