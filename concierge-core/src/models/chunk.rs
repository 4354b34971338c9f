use serde::{Deserialize, Serialize};

/// A unit of indexed website text. `(source_url, chunk_index)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub source_url: String,
    pub category: String,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by a similarity query. `score` is cosine similarity (higher is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub source_url: String,
    pub category: String,
    pub chunk_index: i32,
    pub content: String,
    pub score: f32,
}
