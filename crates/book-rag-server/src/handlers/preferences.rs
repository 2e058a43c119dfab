use crate::models::translate::{PreferencesRequest, PreferencesResponse};
use crate::services::personalization_service::ExperienceLevel;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

fn require_user(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    state
        .jwt
        .user_id_from_headers(headers)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
}

/// GET /api/preferences - the caller's preference row, created with
/// defaults on first read.
pub async fn get_preferences_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let user_id = require_user(&state, &headers)?;

    let prefs = state
        .repo
        .ensure_preferences(&user_id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;

    Ok(Json(PreferencesResponse {
        experience_level: prefs.experience_level.clone(),
        preferred_language: prefs.preferred_language.clone(),
        chapters_read: prefs.chapters(),
    }))
}

/// PUT /api/preferences - update experience level and language.
pub async fn update_preferences_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PreferencesRequest>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let user_id = require_user(&state, &headers)?;

    // Unknown levels collapse to beginner rather than erroring.
    let level = ExperienceLevel::parse(&request.experience_level);

    let prefs = state
        .repo
        .update_preferences(&user_id, level.as_str(), &request.preferred_language)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;

    Ok(Json(PreferencesResponse {
        experience_level: prefs.experience_level.clone(),
        preferred_language: prefs.preferred_language.clone(),
        chapters_read: prefs.chapters(),
    }))
}

/// POST /api/preferences/chapters/{chapter_slug} - mark a chapter as read.
pub async fn track_chapter_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chapter_slug): Path<String>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let user_id = require_user(&state, &headers)?;

    if chapter_slug.trim().is_empty() {
        return Err(ApiError::Validation("chapter_slug is required".to_string()));
    }

    state
        .personalization_service
        .track_chapter_read(&user_id, &chapter_slug)
        .await?;

    let prefs = state
        .repo
        .ensure_preferences(&user_id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;

    Ok(Json(PreferencesResponse {
        experience_level: prefs.experience_level.clone(),
        preferred_language: prefs.preferred_language.clone(),
        chapters_read: prefs.chapters(),
    }))
}
