use crate::document::{chunk_point_id, BookChunk, ChunkMetadata, TokenChunker};
use crate::services::qdrant::{ChunkPayload, IndexPoint, QdrantIndex};
use crate::services::EmbeddingProvider;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::info;

/// Turns chapter text into indexed vectors: chunk, embed, upsert.
pub struct EmbeddingService {
    chunker: TokenChunker,
    embeddings: Arc<dyn EmbeddingProvider>,
    index: QdrantIndex,
}

impl EmbeddingService {
    pub fn new(
        chunker: TokenChunker,
        embeddings: Arc<dyn EmbeddingProvider>,
        index: QdrantIndex,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            index,
        }
    }

    /// Indexes one chapter. Point ids are derived from (slug, ordinal), so
    /// re-running over the same chapter overwrites instead of duplicating.
    pub async fn index_chapter(
        &self,
        text: &str,
        metadata: ChunkMetadata,
    ) -> Result<usize, ApiError> {
        let chunks = self.chunker.chunk(text, metadata.clone())?;
        if chunks.is_empty() {
            info!("Chapter '{}' is empty, nothing to index", metadata.chapter_slug);
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embeddings.embed_batch(&texts).await?;

        let points = build_points(&chunks, vectors)?;
        let count = points.len();
        self.index.upsert(points).await?;

        info!("Indexed {} chunks for '{}'", count, metadata.chapter_slug);
        Ok(count)
    }
}

fn build_points(chunks: &[BookChunk], vectors: Vec<Vec<f32>>) -> Result<Vec<IndexPoint>, ApiError> {
    if chunks.len() != vectors.len() {
        return Err(ApiError::Internal(format!(
            "Embedding count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }

    Ok(chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexPoint {
            id: chunk_point_id(&chunk.metadata.chapter_slug, chunk.ordinal),
            vector,
            payload: ChunkPayload {
                content: chunk.content.clone(),
                chapter_slug: chunk.metadata.chapter_slug.clone(),
                title: chunk.metadata.title.clone(),
                section: chunk.metadata.section.clone(),
                page: chunk.metadata.page,
                ordinal: chunk.ordinal,
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(slug: &str, ordinal: usize, content: &str) -> BookChunk {
        BookChunk {
            content: content.to_string(),
            ordinal,
            token_count: 4,
            metadata: ChunkMetadata {
                chapter_slug: slug.to_string(),
                title: "Chapter".to_string(),
                section: None,
                page: None,
            },
        }
    }

    #[test]
    fn test_build_points_pairs_chunks_with_vectors() {
        let chunks = vec![chunk("ch1", 0, "first"), chunk("ch1", 1, "second")];
        let vectors = vec![vec![0.1, 0.2], vec![0.3, 0.4]];

        let points = build_points(&chunks, vectors).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].payload.content, "first");
        assert_eq!(points[1].payload.ordinal, 1);
        assert_eq!(points[0].id, chunk_point_id("ch1", 0));
        assert_ne!(points[0].id, points[1].id);
    }

    #[test]
    fn test_build_points_rejects_mismatched_lengths() {
        let chunks = vec![chunk("ch1", 0, "only one")];
        let vectors = vec![vec![0.1], vec![0.2]];
        assert!(build_points(&chunks, vectors).is_err());
    }
}
