pub mod agent_service;
pub mod embedding_service;
pub mod gemini;
pub mod personalization_service;
pub mod qdrant;
pub mod rag_agent;
pub mod rag_service;
pub mod translate_agent;
pub mod translation_service;

use crate::database::models::{Conversation, ConversationMode};
use crate::database::Repository;
use crate::models::chat::ChatMessage;
use crate::utils::error::ApiError;
use async_trait::async_trait;
use uuid::Uuid;

pub use qdrant::ScoredChunk;

/// Seam for the embedding backend so retrieval logic can be tested without
/// network access.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Seam for the chat completion backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, ApiError>;
}

/// Seam for conversation lookup and creation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>>;
    async fn create_conversation(
        &self,
        user_id: Option<&str>,
        mode: ConversationMode,
        selected_text: Option<&str>,
    ) -> anyhow::Result<Conversation>;
}

#[async_trait]
impl ConversationStore for Repository {
    async fn get_conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>> {
        Repository::get_conversation(self, id).await
    }

    async fn create_conversation(
        &self,
        user_id: Option<&str>,
        mode: ConversationMode,
        selected_text: Option<&str>,
    ) -> anyhow::Result<Conversation> {
        Repository::create_conversation(self, user_id, mode, selected_text).await
    }
}

/// Seam for the vector index.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        chapter_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, ApiError>;
}
