use crate::database::models::TranslationStatus;
use crate::models::translate::{
    TranslationPendingResponse, TranslationProgressResponse, TranslationRequest,
    TranslationResponse,
};
use crate::services::translation_service::{estimate_seconds, TranslationOutcome};
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct LanguageParam {
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "ur".to_string()
}

/// GET /api/translate/{chapter_slug} - cached translation lookup.
/// 200 with content when completed, 202 while running, 404 when absent.
pub async fn get_translation_handler(
    State(state): State<AppState>,
    Path(chapter_slug): Path<String>,
    Query(params): Query<LanguageParam>,
) -> Result<Response, ApiError> {
    let translation = state
        .translation_service
        .get(&chapter_slug, &params.language)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Translation not found for chapter: {}", chapter_slug))
        })?;

    match TranslationStatus::parse(&translation.status) {
        TranslationStatus::Completed => Ok(Json(TranslationResponse {
            chapter_slug: translation.chapter_slug,
            language: translation.language,
            content: translation.content.unwrap_or_default(),
            created_at: translation.created_at.to_rfc3339(),
        })
        .into_response()),
        TranslationStatus::Failed => Err(ApiError::Internal(
            translation
                .error_message
                .unwrap_or_else(|| "Translation failed".to_string()),
        )),
        status => Ok((
            StatusCode::ACCEPTED,
            Json(TranslationPendingResponse {
                chapter_slug: translation.chapter_slug,
                language: translation.language,
                status: status.as_str().to_string(),
                estimated_seconds: estimate_seconds(status),
            }),
        )
            .into_response()),
    }
}

/// POST /api/translate/{chapter_slug} - request a translation. Serves the
/// cached result when one exists, otherwise translates the posted content.
pub async fn request_translation_handler(
    State(state): State<AppState>,
    Path(chapter_slug): Path<String>,
    Json(request): Json<TranslationRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .translation_service
        .request(&chapter_slug, &request.language, request.content.as_deref())
        .await?;

    match outcome {
        TranslationOutcome::Ready(translation) => Ok(Json(TranslationResponse {
            chapter_slug: translation.chapter_slug,
            language: translation.language,
            content: translation.content.unwrap_or_default(),
            created_at: translation.created_at.to_rfc3339(),
        })
        .into_response()),
        TranslationOutcome::Pending(status) => Ok((
            StatusCode::ACCEPTED,
            Json(TranslationPendingResponse {
                chapter_slug,
                language: request.language,
                status: status.as_str().to_string(),
                estimated_seconds: estimate_seconds(status),
            }),
        )
            .into_response()),
        TranslationOutcome::Failed(translation) => Err(ApiError::Internal(
            translation
                .error_message
                .unwrap_or_else(|| "Translation failed".to_string()),
        )),
    }
}

/// GET /api/translate/{chapter_slug}/progress - polling endpoint for the
/// frontend spinner.
pub async fn translation_progress_handler(
    State(state): State<AppState>,
    Path(chapter_slug): Path<String>,
    Query(params): Query<LanguageParam>,
) -> Result<Json<TranslationProgressResponse>, ApiError> {
    let (status, estimated_seconds) = state
        .translation_service
        .progress(&chapter_slug, &params.language)
        .await?;

    Ok(Json(TranslationProgressResponse {
        chapter_slug,
        language: params.language,
        status,
        estimated_seconds,
    }))
}
