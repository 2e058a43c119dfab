use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Discriminator for how a conversation is grounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    FullBook,
    SelectedText,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::FullBook => "full_book",
            ConversationMode::SelectedText => "selected_text",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "selected_text" => ConversationMode::SelectedText,
            _ => ConversationMode::FullBook,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::InProgress => "in_progress",
            TranslationStatus::Completed => "completed",
            TranslationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => TranslationStatus::Pending,
            "completed" => TranslationStatus::Completed,
            "failed" => TranslationStatus::Failed,
            _ => TranslationStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub mode: String,
    pub selected_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub source_refs: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One row per (chapter_slug, language), enforced by a unique index.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Translation {
    pub id: Uuid,
    pub chapter_slug: String,
    pub language: String,
    pub status: String,
    pub content: Option<String>,
    pub original_hash: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserPreference {
    pub user_id: String,
    pub experience_level: String,
    pub preferred_language: String,
    pub chapters_read: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserPreference {
    /// Chapters the user has read, deduplicated set stored as a JSON array.
    pub fn chapters(&self) -> Vec<String> {
        self.chapters_read
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Projection used by the conversation list endpoint.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationSummaryRow {
    pub id: Uuid,
    pub mode: String,
    pub message_count: i64,
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
