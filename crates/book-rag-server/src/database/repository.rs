use super::models::{
    Conversation, ConversationMode, ConversationSummaryRow, Message, MessageRole, Translation,
    TranslationStatus, UserPreference,
};
use super::DbPool;
use anyhow::Result;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    // ===== Conversations =====

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"SELECT id, user_id, mode, selected_text, created_at, updated_at
               FROM conversations
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(conversation)
    }

    pub async fn create_conversation(
        &self,
        user_id: Option<&str>,
        mode: ConversationMode,
        selected_text: Option<&str>,
    ) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"INSERT INTO conversations (id, user_id, mode, selected_text, created_at, updated_at)
               VALUES ($1, $2, $3, $4, NOW(), NOW())
               RETURNING id, user_id, mode, selected_text, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(mode.as_str())
        .bind(selected_text)
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Created conversation {}", conversation.id);

        Ok(conversation)
    }

    /// Messages in creation order, oldest first.
    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT id, conversation_id, role, content, source_refs, created_at
               FROM messages
               WHERE conversation_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(messages)
    }

    /// Persist the user/assistant pair of a completed turn atomically and
    /// bump the conversation's updated_at.
    pub async fn save_message_pair(
        &self,
        conversation_id: Uuid,
        user_content: &str,
        assistant_content: &str,
        source_refs: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut tx = self.pool.get_pool().begin().await?;

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, source_refs, created_at)
               VALUES ($1, $2, $3, $4, NULL, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(MessageRole::User.as_str())
        .bind(user_content)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, source_refs, created_at)
               VALUES ($1, $2, $3, $4, $5, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(MessageRole::Assistant.as_str())
        .bind(assistant_content)
        .bind(source_refs)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn count_conversations(&self, user_id: &str) -> Result<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM conversations WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(total)
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ConversationSummaryRow>> {
        let rows = sqlx::query_as::<_, ConversationSummaryRow>(
            r#"SELECT
                c.id,
                c.mode,
                (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count,
                (SELECT m.content FROM messages m
                 WHERE m.conversation_id = c.id
                 ORDER BY m.created_at DESC LIMIT 1) AS last_message,
                c.created_at,
                c.updated_at
               FROM conversations c
               WHERE c.user_id = $1
               ORDER BY c.updated_at DESC
               LIMIT $2 OFFSET $3"#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows)
    }

    // ===== Translations =====

    pub async fn get_translation(
        &self,
        chapter_slug: &str,
        language: &str,
    ) -> Result<Option<Translation>> {
        let translation = sqlx::query_as::<_, Translation>(
            r#"SELECT id, chapter_slug, language, status, content, original_hash,
                      error_message, created_at, updated_at, completed_at
               FROM translations
               WHERE chapter_slug = $1 AND language = $2"#,
        )
        .bind(chapter_slug)
        .bind(language)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(translation)
    }

    /// Atomic insert-if-absent on the (chapter_slug, language) unique index.
    /// Returns None when another request already holds the slot; the caller
    /// must then re-read the existing row instead of starting new work.
    pub async fn insert_translation_if_absent(
        &self,
        chapter_slug: &str,
        language: &str,
        original_hash: &str,
    ) -> Result<Option<Translation>> {
        let translation = sqlx::query_as::<_, Translation>(
            r#"INSERT INTO translations
                 (id, chapter_slug, language, status, original_hash, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
               ON CONFLICT (chapter_slug, language) DO NOTHING
               RETURNING id, chapter_slug, language, status, content, original_hash,
                         error_message, created_at, updated_at, completed_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(chapter_slug)
        .bind(language)
        .bind(TranslationStatus::InProgress.as_str())
        .bind(original_hash)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(translation)
    }

    pub async fn complete_translation(&self, id: Uuid, content: &str) -> Result<Translation> {
        let translation = sqlx::query_as::<_, Translation>(
            r#"UPDATE translations
               SET status = $2, content = $3, completed_at = $4, updated_at = NOW()
               WHERE id = $1
               RETURNING id, chapter_slug, language, status, content, original_hash,
                         error_message, created_at, updated_at, completed_at"#,
        )
        .bind(id)
        .bind(TranslationStatus::Completed.as_str())
        .bind(content)
        .bind(Utc::now())
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(translation)
    }

    pub async fn fail_translation(&self, id: Uuid, error_message: &str) -> Result<Translation> {
        let translation = sqlx::query_as::<_, Translation>(
            r#"UPDATE translations
               SET status = $2, error_message = $3, updated_at = NOW()
               WHERE id = $1
               RETURNING id, chapter_slug, language, status, content, original_hash,
                         error_message, created_at, updated_at, completed_at"#,
        )
        .bind(id)
        .bind(TranslationStatus::Failed.as_str())
        .bind(error_message)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(translation)
    }

    // ===== User preferences =====

    pub async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreference>> {
        let prefs = sqlx::query_as::<_, UserPreference>(
            r#"SELECT user_id, experience_level, preferred_language, chapters_read,
                      created_at, updated_at
               FROM user_preferences
               WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(prefs)
    }

    pub async fn ensure_preferences(&self, user_id: &str) -> Result<UserPreference> {
        sqlx::query(
            r#"INSERT INTO user_preferences
                 (user_id, experience_level, preferred_language, chapters_read, created_at, updated_at)
               VALUES ($1, 'beginner', 'en', '[]'::jsonb, NOW(), NOW())
               ON CONFLICT (user_id) DO NOTHING"#,
        )
        .bind(user_id)
        .execute(self.pool.get_pool())
        .await?;

        let prefs = self
            .get_preferences(user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Preferences missing after insert for {}", user_id))?;

        Ok(prefs)
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        experience_level: &str,
        preferred_language: &str,
    ) -> Result<UserPreference> {
        self.ensure_preferences(user_id).await?;

        let prefs = sqlx::query_as::<_, UserPreference>(
            r#"UPDATE user_preferences
               SET experience_level = $2, preferred_language = $3, updated_at = NOW()
               WHERE user_id = $1
               RETURNING user_id, experience_level, preferred_language, chapters_read,
                         created_at, updated_at"#,
        )
        .bind(user_id)
        .bind(experience_level)
        .bind(preferred_language)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(prefs)
    }

    /// Append a chapter slug to the read set, skipping duplicates.
    pub async fn add_chapter_read(&self, user_id: &str, chapter_slug: &str) -> Result<()> {
        let prefs = self.ensure_preferences(user_id).await?;

        let mut chapters = prefs.chapters();
        if chapters.iter().any(|c| c == chapter_slug) {
            return Ok(());
        }
        chapters.push(chapter_slug.to_string());

        sqlx::query(
            "UPDATE user_preferences SET chapters_read = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(serde_json::json!(chapters))
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }
}
