use thiserror::Error;

use crate::contacts::ContactError;
use crate::embeddings::EmbeddingError;
use crate::generation::GenerationError;
use crate::websearch::WebSearchError;

#[derive(Error, Debug)]
pub enum ConciergeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Contacts error: {0}")]
    Contacts(#[from] ContactError),

    #[error("Web search error: {0}")]
    WebSearch(#[from] WebSearchError),
}

/// Failures of the record store, the vector index and the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate key: {0}")]
    Duplicate(String),

    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Maps a unique-constraint violation to `Duplicate`, everything else to `Database`.
    pub fn from_insert(err: sqlx::Error, key: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(key.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
