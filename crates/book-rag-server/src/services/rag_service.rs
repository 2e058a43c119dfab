use crate::config::RagConfig;
use crate::models::chat::SourceReference;
use crate::services::{EmbeddingProvider, ScoredChunk, VectorSearchProvider};
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a retrieval pass. `is_covered` is false when no chunk
/// cleared the confidence threshold, which means the question is outside
/// the book and no model call should be made.
#[derive(Debug)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub is_covered: bool,
}

/// Retrieval engine: embeds the query, searches the index and gates the
/// result on the confidence threshold.
pub struct RagService {
    embeddings: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorSearchProvider>,
    config: RagConfig,
}

impl RagService {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorSearchProvider>,
        config: RagConfig,
    ) -> Self {
        Self {
            embeddings,
            index,
            config,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        chapter_filter: Option<&str>,
    ) -> Result<RetrievalResult, ApiError> {
        if query.trim().is_empty() {
            debug!("Empty query, skipping retrieval");
            return Ok(RetrievalResult {
                chunks: Vec::new(),
                is_covered: false,
            });
        }

        let vector = self.embeddings.embed(query).await?;

        let mut chunks = self
            .index
            .search(
                &vector,
                self.config.max_context_chunks,
                Some(self.config.confidence_threshold),
                chapter_filter,
            )
            .await?;

        // Gate locally as well; the backend threshold is advisory.
        chunks.retain(|c| c.score >= self.config.confidence_threshold);

        let is_covered = !chunks.is_empty();
        debug!(
            "Retrieved {} chunks above {} (covered: {})",
            chunks.len(),
            self.config.confidence_threshold,
            is_covered
        );

        Ok(RetrievalResult { chunks, is_covered })
    }

    /// Joins chunk contents into the prompt context, each under a numbered
    /// header naming the chapter, section and page it came from.
    pub fn build_context(&self, chunks: &[ScoredChunk]) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mut source = format!("[{}", c.payload.title);
                if let Some(section) = &c.payload.section {
                    source.push_str(", ");
                    source.push_str(section);
                }
                if let Some(page) = c.payload.page {
                    source.push_str(&format!(", Page {}", page));
                }
                source.push(']');
                format!("--- Source {} {} ---\n{}", i + 1, source, c.payload.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Deduplicates chunks into source references by (chapter, section),
    /// keeping retrieval order. The first chunk seen for a source supplies
    /// its relevance score.
    pub fn extract_sources(&self, chunks: &[ScoredChunk]) -> Vec<SourceReference> {
        let mut sources: Vec<SourceReference> = Vec::new();

        for chunk in chunks {
            let seen = sources
                .iter()
                .any(|s| s.chapter == chunk.payload.title && s.section == chunk.payload.section);
            if !seen {
                sources.push(SourceReference {
                    chapter: chunk.payload.title.clone(),
                    section: chunk.payload.section.clone(),
                    page: chunk.payload.page,
                    relevance: chunk.score,
                });
            }
        }

        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::qdrant::ChunkPayload;
    use crate::services::MockEmbeddingProvider;
    use async_trait::async_trait;

    /// Index stub returning a fixed hit list regardless of the query.
    struct FixedIndex {
        hits: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl VectorSearchProvider for FixedIndex {
        async fn search(
            &self,
            _vector: &[f32],
            _limit: usize,
            _score_threshold: Option<f32>,
            _chapter_filter: Option<&str>,
        ) -> Result<Vec<ScoredChunk>, ApiError> {
            Ok(self.hits.clone())
        }
    }

    fn config() -> RagConfig {
        RagConfig {
            confidence_threshold: 0.7,
            max_context_chunks: 5,
            chunk_size: 512,
            chunk_overlap: 50,
            history_limit: 20,
        }
    }

    fn scored(score: f32, title: &str, section: Option<&str>) -> ScoredChunk {
        ScoredChunk {
            score,
            payload: ChunkPayload {
                content: format!("content at {}", score),
                chapter_slug: "ch1".to_string(),
                title: title.to_string(),
                section: section.map(String::from),
                page: None,
                ordinal: 0,
            },
        }
    }

    fn service_with_hits(hits: Vec<ScoredChunk>) -> RagService {
        let mut embeddings = MockEmbeddingProvider::new();
        embeddings
            .expect_embed()
            .returning(|_| Ok(vec![0.1, 0.2, 0.3]));

        RagService::new(
            Arc::new(embeddings),
            Arc::new(FixedIndex { hits }),
            config(),
        )
    }

    #[tokio::test]
    async fn test_threshold_gates_low_scoring_chunks() {
        let service = service_with_hits(vec![
            scored(0.85, "Memory", None),
            scored(0.75, "Memory", None),
            scored(0.50, "Memory", None),
        ]);

        let result = service.retrieve("how do synapses form?", None).await.unwrap();
        assert_eq!(result.chunks.len(), 2);
        assert!(result.is_covered);
    }

    #[tokio::test]
    async fn test_empty_query_skips_embedding() {
        let mut embeddings = MockEmbeddingProvider::new();
        embeddings.expect_embed().times(0);

        let service = RagService::new(
            Arc::new(embeddings),
            Arc::new(FixedIndex { hits: vec![] }),
            config(),
        );

        let result = service.retrieve("   ", None).await.unwrap();
        assert!(result.chunks.is_empty());
        assert!(!result.is_covered);
    }

    #[tokio::test]
    async fn test_no_hits_means_not_covered() {
        let service = service_with_hits(vec![]);
        let result = service.retrieve("what is the stock market?", None).await.unwrap();
        assert!(result.chunks.is_empty());
        assert!(!result.is_covered);
    }

    #[test]
    fn test_context_carries_numbered_source_headers() {
        let service = service_with_hits(vec![]);
        let mut first = scored(0.9, "Sleep", Some("REM"));
        first.payload.page = Some(42);
        let chunks = vec![first, scored(0.8, "Sleep", None)];

        let context = service.build_context(&chunks);
        assert!(context.contains("--- Source 1 [Sleep, REM, Page 42] ---"));
        assert!(context.contains("--- Source 2 [Sleep] ---"));
        assert!(context.contains("content at 0.9"));
    }

    #[test]
    fn test_sources_dedupe_by_chapter_and_section() {
        let service = service_with_hits(vec![]);
        let chunks = vec![
            scored(0.8, "Sleep", Some("REM")),
            scored(0.9, "Sleep", Some("REM")),
            scored(0.75, "Sleep", Some("Dreams")),
        ];

        let sources = service.extract_sources(&chunks);
        assert_eq!(sources.len(), 2);
        // the first chunk seen for a source sets its relevance
        assert_eq!(sources[0].relevance, 0.8);
        assert_eq!(sources[0].section.as_deref(), Some("REM"));
        assert_eq!(sources[1].section.as_deref(), Some("Dreams"));
    }
}
