use crate::config::TranslationConfig;
use crate::database::models::{Translation, TranslationStatus};
use crate::database::Repository;
use crate::services::translate_agent::TranslateAgent;
use crate::utils::error::ApiError;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info};

/// What a translation request resolved to. `Pending` covers both the row
/// another request is currently working on and the one this process just
/// lost the insert race for.
#[derive(Debug)]
pub enum TranslationOutcome {
    Ready(Translation),
    Pending(TranslationStatus),
    Failed(Translation),
}

/// Cache-first chapter translation. The unique (chapter_slug, language)
/// index plus the conditional insert make sure at most one request pays
/// for the model call; everyone else observes the cached row.
pub struct TranslationService {
    repo: Arc<Repository>,
    agent: TranslateAgent,
    config: TranslationConfig,
}

pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

pub fn estimate_seconds(status: TranslationStatus) -> Option<u64> {
    match status {
        TranslationStatus::Pending => Some(60),
        TranslationStatus::InProgress => Some(30),
        TranslationStatus::Completed => Some(0),
        TranslationStatus::Failed => None,
    }
}

impl TranslationService {
    pub fn new(repo: Arc<Repository>, agent: TranslateAgent, config: TranslationConfig) -> Self {
        Self { repo, agent, config }
    }

    fn validate(&self, chapter_slug: &str, language: &str) -> Result<(), ApiError> {
        if chapter_slug.trim().is_empty() {
            return Err(ApiError::Validation("chapter_slug is required".to_string()));
        }
        if !self.config.supported_languages.iter().any(|l| l == language) {
            return Err(ApiError::UnsupportedLanguage(format!(
                "{}. Supported languages: {:?}",
                language, self.config.supported_languages
            )));
        }
        Ok(())
    }

    pub async fn get(
        &self,
        chapter_slug: &str,
        language: &str,
    ) -> Result<Option<Translation>, ApiError> {
        self.validate(chapter_slug, language)?;
        self.repo
            .get_translation(chapter_slug, language)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))
    }

    /// Returns the cached translation, or performs it if this request wins
    /// the insert race. A failed row is terminal; re-translating a failed
    /// chapter requires clearing the row first.
    pub async fn request(
        &self,
        chapter_slug: &str,
        language: &str,
        content: Option<&str>,
    ) -> Result<TranslationOutcome, ApiError> {
        self.validate(chapter_slug, language)?;

        if let Some(existing) = self
            .repo
            .get_translation(chapter_slug, language)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?
        {
            return Ok(outcome_for(existing));
        }

        let content = content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                ApiError::MissingContent(format!(
                    "No translation exists for '{}' and no content was provided",
                    chapter_slug
                ))
            })?;

        let hash = content_hash(content);
        let claimed = self
            .repo
            .insert_translation_if_absent(chapter_slug, language, &hash)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        let row = match claimed {
            Some(row) => row,
            // A concurrent request inserted first; let it do the work.
            None => return Ok(TranslationOutcome::Pending(TranslationStatus::InProgress)),
        };

        info!(
            "Translating chapter '{}' to {} ({} chars)",
            chapter_slug,
            language,
            content.len()
        );

        match self.agent.translate_chunked(content, language).await {
            Ok(translated) => {
                let completed = self
                    .repo
                    .complete_translation(row.id, &translated)
                    .await
                    .map_err(|e| ApiError::Database(e.to_string()))?;
                info!("Translation of '{}' completed", chapter_slug);
                Ok(TranslationOutcome::Ready(completed))
            }
            Err(e) => {
                error!("Translation of '{}' failed: {}", chapter_slug, e);
                let failed = self
                    .repo
                    .fail_translation(row.id, &e.to_string())
                    .await
                    .map_err(|db| ApiError::Database(db.to_string()))?;
                Ok(TranslationOutcome::Failed(failed))
            }
        }
    }

    /// Status plus a rough remaining-time estimate for polling clients.
    pub async fn progress(
        &self,
        chapter_slug: &str,
        language: &str,
    ) -> Result<(String, Option<u64>), ApiError> {
        self.validate(chapter_slug, language)?;

        let translation = self
            .repo
            .get_translation(chapter_slug, language)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        Ok(match translation {
            Some(t) => {
                let status = TranslationStatus::parse(&t.status);
                (status.as_str().to_string(), estimate_seconds(status))
            }
            None => ("not_found".to_string(), None),
        })
    }
}

fn outcome_for(translation: Translation) -> TranslationOutcome {
    match TranslationStatus::parse(&translation.status) {
        TranslationStatus::Completed => TranslationOutcome::Ready(translation),
        TranslationStatus::Failed => TranslationOutcome::Failed(translation),
        status => TranslationOutcome::Pending(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn translation(status: &str) -> Translation {
        Translation {
            id: Uuid::new_v4(),
            chapter_slug: "ch1".to_string(),
            language: "ur".to_string(),
            status: status.to_string(),
            content: None,
            original_hash: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_estimates_by_status() {
        assert_eq!(estimate_seconds(TranslationStatus::Pending), Some(60));
        assert_eq!(estimate_seconds(TranslationStatus::InProgress), Some(30));
        assert_eq!(estimate_seconds(TranslationStatus::Completed), Some(0));
        assert_eq!(estimate_seconds(TranslationStatus::Failed), None);
    }

    #[test]
    fn test_content_hash_is_stable_sha256_hex() {
        let first = content_hash("chapter text");
        let second = content_hash("chapter text");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, content_hash("chapter text "));
    }

    #[test]
    fn test_existing_rows_map_to_outcomes() {
        assert!(matches!(
            outcome_for(translation("completed")),
            TranslationOutcome::Ready(_)
        ));
        assert!(matches!(
            outcome_for(translation("failed")),
            TranslationOutcome::Failed(_)
        ));
        assert!(matches!(
            outcome_for(translation("in_progress")),
            TranslationOutcome::Pending(TranslationStatus::InProgress)
        ));
        assert!(matches!(
            outcome_for(translation("pending")),
            TranslationOutcome::Pending(TranslationStatus::Pending)
        ));
    }
}
