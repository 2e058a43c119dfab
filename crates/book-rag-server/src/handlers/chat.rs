use crate::models::chat::{
    ChatRequest, ChatResponse, ConversationDetailResponse, ConversationListResponse,
    ConversationSummary, MessageResponse, SelectedTextRequest,
};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

/// POST /api/chat - full-book question answering.
pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = state.jwt.user_id_from_headers(&headers);
    let (message, conversation_id) = request.validate()?;

    info!(
        "Chat request (user: {}, conversation: {:?})",
        user_id.as_deref().unwrap_or("anonymous"),
        conversation_id
    );

    let response = state
        .agent_service
        .chat(&message, conversation_id, user_id.as_deref())
        .await?;

    Ok(Json(response))
}

/// POST /api/chat/selected - answers grounded in a user selection.
pub async fn chat_selected_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SelectedTextRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = state.jwt.user_id_from_headers(&headers);
    let (message, selected_text, conversation_id) = request.validate()?;

    let response = state
        .agent_service
        .chat_selected(&message, &selected_text, conversation_id, user_id.as_deref())
        .await?;

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

const PREVIEW_LENGTH: usize = 100;

/// GET /api/chat/conversations - the authenticated user's conversations,
/// most recently active first.
pub async fn list_conversations_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let user_id = state
        .jwt
        .user_id_from_headers(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let limit = params.limit.clamp(1, 100);
    let offset = params.offset.max(0);

    let total = state
        .repo
        .count_conversations(&user_id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;
    let rows = state
        .repo
        .list_conversations(&user_id, limit, offset)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;

    let conversations = rows
        .into_iter()
        .map(|row| ConversationSummary {
            id: row.id.to_string(),
            mode: row.mode,
            message_count: row.message_count,
            last_message_preview: row.last_message.map(|m| preview(&m)),
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(ConversationListResponse {
        conversations,
        total,
    }))
}

/// GET /api/chat/conversations/{id} - one conversation with its messages.
/// Conversations owned by other users read as absent.
pub async fn get_conversation_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let user_id = state
        .jwt
        .user_id_from_headers(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let conversation = state
        .repo
        .get_conversation(conversation_id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    if conversation.user_id.as_deref() != Some(user_id.as_str()) {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }

    let messages = state
        .repo
        .get_messages(conversation.id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id.to_string(),
            role: m.role,
            content: m.content,
            created_at: m.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(ConversationDetailResponse {
        id: conversation.id.to_string(),
        user_id: conversation.user_id,
        mode: conversation.mode,
        selected_text: conversation.selected_text,
        messages,
        created_at: conversation.created_at.to_rfc3339(),
        updated_at: conversation.updated_at.to_rfc3339(),
    }))
}

fn preview(content: &str) -> String {
    if content.len() > PREVIEW_LENGTH {
        let cut = content
            .char_indices()
            .take_while(|(i, _)| *i < PREVIEW_LENGTH)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &content[..cut])
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_previews_pass_through() {
        assert_eq!(preview("hello"), "hello");
    }

    #[test]
    fn test_long_previews_are_truncated() {
        let long = "x".repeat(150);
        let result = preview(&long);
        assert!(result.ends_with("..."));
        assert_eq!(result.len(), PREVIEW_LENGTH + 3);
    }

    #[test]
    fn test_preview_respects_utf8_boundaries() {
        let long = "é".repeat(120);
        let result = preview(&long);
        assert!(result.ends_with("..."));
    }
}
