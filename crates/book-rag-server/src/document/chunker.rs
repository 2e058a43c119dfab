use crate::utils::error::ApiError;
use sha2::{Digest, Sha256};
use tiktoken_rs::CoreBPE;
use tracing::debug;
use uuid::Uuid;

/// Metadata attached to every chunk produced from one source file.
#[derive(Debug, Clone, Default)]
pub struct ChunkMetadata {
    pub chapter_slug: String,
    pub title: String,
    pub section: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BookChunk {
    pub content: String,
    pub ordinal: usize,
    pub token_count: usize,
    pub metadata: ChunkMetadata,
}

/// Splits text into overlapping token windows with stable 0-based ordinals.
/// Tokenization uses cl100k_base to match the embedding model.
pub struct TokenChunker {
    bpe: CoreBPE,
    chunk_size: usize,
    overlap: usize,
}

impl TokenChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ApiError> {
        if chunk_size == 0 {
            return Err(ApiError::Config("chunk_size must be positive".to_string()));
        }
        // overlap >= chunk_size would make the window stride non-positive
        if overlap >= chunk_size {
            return Err(ApiError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }

        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| ApiError::Config(format!("Failed to load cl100k_base: {}", e)))?;

        Ok(Self {
            bpe,
            chunk_size,
            overlap,
        })
    }

    pub fn chunk(&self, text: &str, metadata: ChunkMetadata) -> Result<Vec<BookChunk>, ApiError> {
        let tokens = self.bpe.encode_with_special_tokens(text);
        let total = tokens.len();

        let mut chunks = Vec::new();
        if total == 0 {
            return Ok(chunks);
        }

        let stride = self.chunk_size - self.overlap;
        let mut start = 0;
        let mut ordinal = 0;

        while start < total {
            let end = (start + self.chunk_size).min(total);
            let window = tokens[start..end].to_vec();
            let token_count = window.len();

            let content = self
                .bpe
                .decode(window)
                .map_err(|e| ApiError::Internal(format!("Token decode failed: {}", e)))?;

            chunks.push(BookChunk {
                content,
                ordinal,
                token_count,
                metadata: metadata.clone(),
            });

            ordinal += 1;
            start += stride;
        }

        debug!(
            "Chunked '{}' into {} chunks ({} tokens)",
            metadata.chapter_slug,
            chunks.len(),
            total
        );

        Ok(chunks)
    }
}

/// Stable point id for a chunk: first 16 bytes of sha256("{slug}:{ordinal}")
/// as a UUID. Re-ingesting the same chapter yields the same ids, so uploads
/// are upserts.
pub fn chunk_point_id(chapter_slug: &str, ordinal: usize) -> Uuid {
    let digest = Sha256::digest(format!("{}:{}", chapter_slug, ordinal).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
