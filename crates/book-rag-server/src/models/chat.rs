use crate::utils::error::ApiError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_SELECTED_TEXT_LENGTH: usize = 10;
pub const MAX_SELECTED_TEXT_LENGTH: usize = 50_000;
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

// ===== LLM MESSAGE MODEL =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A single message in an LLM exchange. Constructed only through the role
/// helpers so role and content are always present and well-formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(String, Option<Uuid>), ApiError> {
        let message = validate_message(&self.message)?;
        let conversation_id = validate_conversation_id(self.conversation_id.as_deref())?;
        Ok((message, conversation_id))
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectedTextRequest {
    pub message: String,
    pub selected_text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl SelectedTextRequest {
    pub fn validate(&self) -> Result<(String, String, Option<Uuid>), ApiError> {
        let message = validate_message(&self.message)?;

        let selected = self.selected_text.trim();
        if selected.is_empty() {
            return Err(ApiError::Validation(
                "Selected text cannot be empty or whitespace only".to_string(),
            ));
        }
        if selected.len() < MIN_SELECTED_TEXT_LENGTH {
            return Err(ApiError::Validation(format!(
                "Selected text must be at least {} characters",
                MIN_SELECTED_TEXT_LENGTH
            )));
        }
        if selected.len() > MAX_SELECTED_TEXT_LENGTH {
            return Err(ApiError::Validation(format!(
                "Selected text cannot exceed {} characters",
                MAX_SELECTED_TEXT_LENGTH
            )));
        }

        let conversation_id = validate_conversation_id(self.conversation_id.as_deref())?;
        Ok((message, selected.to_string(), conversation_id))
    }
}

fn validate_message(message: &str) -> Result<String, ApiError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation(
            "Message cannot be empty or whitespace only".to_string(),
        ));
    }
    if trimmed.len() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::Validation(format!(
            "Message cannot exceed {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_conversation_id(id: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match id {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Uuid>()
            .map(Some)
            .map_err(|_| ApiError::Validation("conversation_id must be a valid UUID".to_string())),
    }
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceReference {
    pub chapter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    pub relevance: f32,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,
    pub sources: Vec<SourceReference>,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub mode: String,
    pub message_count: i64,
    pub last_message_preview: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetailResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub mode: String,
    pub selected_text: Option<String>,
    pub messages: Vec<MessageResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_trimmed_and_validated() {
        let request = ChatRequest {
            message: "  What is Python?  ".to_string(),
            conversation_id: None,
        };
        let (message, id) = request.validate().unwrap();
        assert_eq!(message, "What is Python?");
        assert!(id.is_none());
    }

    #[test]
    fn test_whitespace_message_rejected() {
        let request = ChatRequest {
            message: "   \n\t ".to_string(),
            conversation_id: None,
        };
        assert!(matches!(
            request.validate(),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_oversized_message_rejected() {
        let request = ChatRequest {
            message: "x".repeat(MAX_MESSAGE_LENGTH + 1),
            conversation_id: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_conversation_id_must_be_uuid() {
        let request = ChatRequest {
            message: "hello".to_string(),
            conversation_id: Some("not-a-uuid".to_string()),
        };
        assert!(request.validate().is_err());

        let request = ChatRequest {
            message: "hello".to_string(),
            conversation_id: Some("550e8400-e29b-41d4-a716-446655440000".to_string()),
        };
        assert!(request.validate().unwrap().1.is_some());
    }

    #[test]
    fn test_selected_text_length_bounds() {
        let short = SelectedTextRequest {
            message: "what is this".to_string(),
            selected_text: "too short".to_string(),
            conversation_id: None,
        };
        assert!(short.validate().is_err());

        let valid = SelectedTextRequest {
            message: "what is this".to_string(),
            selected_text: "This selection is long enough to pass.".to_string(),
            conversation_id: None,
        };
        assert!(valid.validate().is_ok());
    }
}
