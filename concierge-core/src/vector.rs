//! Similarity index over website content chunks.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::chunk::{ContentChunk, ScoredChunk};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top `k` chunks by cosine similarity, highest score first.
    async fn query(&self, embedding: &[f32], k: u32) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Insert or replace chunks keyed by `(source_url, chunk_index)`. Returns rows written.
    async fn upsert(&self, chunks: &[ContentChunk]) -> Result<usize, StoreError>;

    async fn health(&self) -> Result<String, StoreError>;
}

// ============================================================================
// pgvector
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgVectorIndex {
    pool: PgPool,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ChunkRow {
    source_url: String,
    category: String,
    chunk_index: i32,
    content: String,
    score: Option<f64>,
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn query(&self, embedding: &[f32], k: u32) -> Result<Vec<ScoredChunk>, StoreError> {
        let vector = Vector::from(embedding.to_vec());

        // score = 1 - cosine distance
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT
                source_url,
                category,
                chunk_index,
                content,
                1 - (embedding <=> $1::vector) AS score
            FROM content_chunks
            ORDER BY embedding <=> $1::vector
            LIMIT $2
            "#,
        )
        .bind(&vector)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredChunk {
                source_url: row.source_url,
                category: row.category,
                chunk_index: row.chunk_index,
                content: row.content,
                score: row.score.unwrap_or(0.0) as f32,
            })
            .collect())
    }

    async fn upsert(&self, chunks: &[ContentChunk]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO content_chunks (source_url, category, chunk_index, content, embedding, updated_at)
                VALUES ($1, $2, $3, $4, $5, now())
                ON CONFLICT (source_url, chunk_index) DO UPDATE
                SET category = EXCLUDED.category,
                    content = EXCLUDED.content,
                    embedding = EXCLUDED.embedding,
                    updated_at = now()
                "#,
            )
            .bind(&chunk.source_url)
            .bind(&chunk.category)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(Vector::from(chunk.embedding.clone()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(chunks.len())
    }

    async fn health(&self) -> Result<String, StoreError> {
        let version = crate::db::check_pgvector(&self.pool).await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM content_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(format!("pgvector {} ({} chunks)", version, count))
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Brute-force cosine index.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    chunks: RwLock<Vec<ContentChunk>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn query(&self, embedding: &[f32], k: u32) -> Result<Vec<ScoredChunk>, StoreError> {
        let chunks = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|c| ScoredChunk {
                source_url: c.source_url.clone(),
                category: c.category.clone(),
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                score: cosine_similarity(embedding, &c.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k as usize);
        Ok(scored)
    }

    async fn upsert(&self, chunks: &[ContentChunk]) -> Result<usize, StoreError> {
        let mut stored = self.chunks.write().await;
        for chunk in chunks {
            match stored
                .iter_mut()
                .find(|c| c.source_url == chunk.source_url && c.chunk_index == chunk.chunk_index)
            {
                Some(existing) => *existing = chunk.clone(),
                None => stored.push(chunk.clone()),
            }
        }
        Ok(chunks.len())
    }

    async fn health(&self) -> Result<String, StoreError> {
        Ok(format!("memory ({} chunks)", self.chunks.read().await.len()))
    }
}
