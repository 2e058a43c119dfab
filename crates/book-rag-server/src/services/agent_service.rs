use crate::database::models::{Conversation, ConversationMode, MessageRole};
use crate::database::Repository;
use crate::models::chat::{ChatMessage, ChatResponse};
use crate::services::personalization_service::PersonalizationService;
use crate::services::rag_agent::RagAgent;
use crate::services::rag_service::RagService;
use crate::services::ConversationStore;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Ties the pipeline together for one chat turn: conversation lookup,
/// retrieval, generation, persistence.
pub struct AgentService {
    repo: Arc<Repository>,
    rag: RagService,
    agent: RagAgent,
    personalization: PersonalizationService,
}

impl AgentService {
    pub fn new(
        repo: Arc<Repository>,
        rag: RagService,
        agent: RagAgent,
        personalization: PersonalizationService,
    ) -> Self {
        Self {
            repo,
            rag,
            agent,
            personalization,
        }
    }

    /// Full-book question answering.
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<Uuid>,
        user_id: Option<&str>,
    ) -> Result<ChatResponse, ApiError> {
        let conversation = self
            .resolve_conversation(conversation_id, user_id, ConversationMode::FullBook, None)
            .await?;

        let history = self.load_history(conversation.id).await?;
        let retrieval = self.rag.retrieve(message, None).await?;
        let context = self.rag.build_context(&retrieval.chunks);
        let sources = self.rag.extract_sources(&retrieval.chunks);

        let personalization = match self.personalization.get_user_context(user_id).await? {
            Some(ctx) => Some(self.personalization.generate_prompt_modifier(Some(&ctx))),
            None => None,
        };

        let answer = self
            .agent
            .generate_response(
                message,
                Some(&context),
                &history,
                retrieval.is_covered,
                ConversationMode::FullBook,
                personalization.as_deref(),
            )
            .await?;

        let source_refs = if sources.is_empty() {
            None
        } else {
            serde_json::to_value(&sources).ok()
        };
        self.repo
            .save_message_pair(conversation.id, message, &answer, source_refs)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        info!(
            "Chat turn saved (conversation: {}, covered: {})",
            conversation.id, retrieval.is_covered
        );

        Ok(ChatResponse {
            message: answer,
            conversation_id: conversation.id.to_string(),
            sources,
        })
    }

    /// Selected-text mode: the selection itself is the only context, the
    /// vector index is not consulted.
    pub async fn chat_selected(
        &self,
        message: &str,
        selected_text: &str,
        conversation_id: Option<Uuid>,
        user_id: Option<&str>,
    ) -> Result<ChatResponse, ApiError> {
        let conversation = self
            .resolve_conversation(
                conversation_id,
                user_id,
                ConversationMode::SelectedText,
                Some(selected_text),
            )
            .await?;

        // Continued conversations keep answering about their original
        // selection.
        let selection = conversation
            .selected_text
            .clone()
            .unwrap_or_else(|| selected_text.to_string());

        let history = self.load_history(conversation.id).await?;

        let personalization = match self.personalization.get_user_context(user_id).await? {
            Some(ctx) => Some(self.personalization.generate_prompt_modifier(Some(&ctx))),
            None => None,
        };

        let answer = self
            .agent
            .generate_response(
                message,
                Some(&selection),
                &history,
                true,
                ConversationMode::SelectedText,
                personalization.as_deref(),
            )
            .await?;

        self.repo
            .save_message_pair(conversation.id, message, &answer, None)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        Ok(ChatResponse {
            message: answer,
            conversation_id: conversation.id.to_string(),
            sources: Vec::new(),
        })
    }

    async fn resolve_conversation(
        &self,
        conversation_id: Option<Uuid>,
        user_id: Option<&str>,
        mode: ConversationMode,
        selected_text: Option<&str>,
    ) -> Result<Conversation, ApiError> {
        resolve_conversation(
            self.repo.as_ref(),
            conversation_id,
            user_id,
            mode,
            selected_text,
        )
        .await
    }

    async fn load_history(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, ApiError> {
        let messages = self
            .repo
            .get_messages(conversation_id)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        Ok(messages
            .into_iter()
            .map(|m| {
                if m.role == MessageRole::Assistant.as_str() {
                    ChatMessage::assistant(m.content)
                } else {
                    ChatMessage::user(m.content)
                }
            })
            .collect())
    }
}

/// An existing conversation id is returned unchanged. A missing or absent
/// id starts a fresh conversation; clients holding a stale id keep working,
/// they just lose the old history.
async fn resolve_conversation(
    store: &dyn ConversationStore,
    conversation_id: Option<Uuid>,
    user_id: Option<&str>,
    mode: ConversationMode,
    selected_text: Option<&str>,
) -> Result<Conversation, ApiError> {
    if let Some(id) = conversation_id {
        let existing = store
            .get_conversation(id)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;
        if let Some(conversation) = existing {
            return Ok(conversation);
        }
        debug!("Conversation {} not found, starting a new one", id);
    }

    store
        .create_conversation(user_id, mode, selected_text)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store stub holding at most one conversation.
    struct SingleRowStore {
        existing: Option<Conversation>,
        creates: AtomicUsize,
    }

    impl SingleRowStore {
        fn new(existing: Option<Conversation>) -> Self {
            Self {
                existing,
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ConversationStore for SingleRowStore {
        async fn get_conversation(&self, id: Uuid) -> anyhow::Result<Option<Conversation>> {
            Ok(self.existing.clone().filter(|c| c.id == id))
        }

        async fn create_conversation(
            &self,
            user_id: Option<&str>,
            mode: ConversationMode,
            selected_text: Option<&str>,
        ) -> anyhow::Result<Conversation> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Ok(conversation(Uuid::new_v4(), user_id, mode, selected_text))
        }
    }

    fn conversation(
        id: Uuid,
        user_id: Option<&str>,
        mode: ConversationMode,
        selected_text: Option<&str>,
    ) -> Conversation {
        Conversation {
            id,
            user_id: user_id.map(String::from),
            mode: mode.as_str().to_string(),
            selected_text: selected_text.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_existing_conversation_is_returned_unchanged() {
        let id = Uuid::new_v4();
        let store = SingleRowStore::new(Some(conversation(
            id,
            Some("u1"),
            ConversationMode::FullBook,
            None,
        )));

        let resolved =
            resolve_conversation(&store, Some(id), Some("u1"), ConversationMode::FullBook, None)
                .await
                .unwrap();
        assert_eq!(resolved.id, id);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_id_starts_a_new_one() {
        let store = SingleRowStore::new(None);
        let stale = Uuid::new_v4();

        let resolved = resolve_conversation(
            &store,
            Some(stale),
            None,
            ConversationMode::FullBook,
            None,
        )
        .await
        .unwrap();

        assert_ne!(resolved.id, stale);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_id_creates_with_selection() {
        let store = SingleRowStore::new(None);

        let resolved = resolve_conversation(
            &store,
            None,
            Some("u1"),
            ConversationMode::SelectedText,
            Some("the hippocampus"),
        )
        .await
        .unwrap();

        assert_eq!(resolved.selected_text.as_deref(), Some("the hippocampus"));
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }
}
