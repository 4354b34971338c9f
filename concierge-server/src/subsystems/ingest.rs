//! Reindex: embed submitted website chunks and upsert them into the vector index.
//!
//! Chunks whose embedding fails are counted and skipped; the rest are written
//! in one upsert.

use concierge_core::ipc::ChunkInput;
use concierge_core::models::ContentChunk;
use concierge_core::{EmbeddingBackend, VectorIndex};
use serde::Serialize;

use super::bounded;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub indexed: usize,
    pub failed: usize,
}

pub async fn reindex(
    chunks: Vec<ChunkInput>,
    embedder: &dyn EmbeddingBackend,
    index: &dyn VectorIndex,
    store_timeout_seconds: u64,
) -> anyhow::Result<ReindexReport> {
    let mut report = ReindexReport::default();
    let mut embedded: Vec<ContentChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let content = chunk.content.trim();
        if content.is_empty() || chunk.source_url.trim().is_empty() {
            report.failed += 1;
            continue;
        }
        match embedder.embed(content).await {
            Ok(embedding) => embedded.push(ContentChunk {
                source_url: chunk.source_url,
                category: chunk.category,
                chunk_index: chunk.chunk_index,
                content: content.to_string(),
                embedding,
            }),
            Err(e) => {
                tracing::warn!(
                    source_url = %chunk.source_url,
                    chunk_index = chunk.chunk_index,
                    error = %e,
                    "Chunk embedding failed; skipping"
                );
                report.failed += 1;
            }
        }
    }

    if !embedded.is_empty() {
        report.indexed = bounded(store_timeout_seconds, index.upsert(&embedded)).await?;
    }

    tracing::info!(
        indexed = report.indexed,
        failed = report.failed,
        backend = embedder.name(),
        "Reindex complete"
    );
    Ok(report)
}
