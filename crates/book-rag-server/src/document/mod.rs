pub mod chunker;

pub use chunker::{chunk_point_id, BookChunk, ChunkMetadata, TokenChunker};
