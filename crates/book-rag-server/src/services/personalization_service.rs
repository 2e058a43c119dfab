use crate::database::Repository;
use crate::utils::error::ApiError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::Intermediate => "intermediate",
            ExperienceLevel::Advanced => "advanced",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "intermediate" => ExperienceLevel::Intermediate,
            "advanced" => ExperienceLevel::Advanced,
            _ => ExperienceLevel::Beginner,
        }
    }
}

/// Per-user signals folded into the system prompt.
#[derive(Debug, Clone)]
pub struct PersonalizationContext {
    pub experience_level: ExperienceLevel,
    pub chapters_read: Vec<String>,
}

const ANONYMOUS_MODIFIER: &str = "Provide clear, helpful explanations suitable for a general audience. \
Balance clarity with technical accuracy.";

impl PersonalizationContext {
    pub fn to_prompt_context(&self) -> String {
        let mut context = match self.experience_level {
            ExperienceLevel::Beginner => {
                "The user is a beginner. Use simple, clear explanations \
with examples. Avoid jargon and technical terms when possible. \
Break down complex concepts into smaller, digestible pieces."
            }
            ExperienceLevel::Intermediate => {
                "The user has intermediate knowledge. They are familiar with \
basic concepts. You can use some technical terms but explain \
advanced concepts when they appear."
            }
            ExperienceLevel::Advanced => {
                "The user is advanced and has technical expertise. You can use \
technical terminology freely and provide detailed, in-depth \
explanations. Focus on nuances and advanced use cases."
            }
        }
        .to_string();

        if !self.chapters_read.is_empty() {
            let count = self.chapters_read.len();
            let listed = self.chapters_read[..count.min(5)].join(", ");
            let ellipsis = if count > 5 { "..." } else { "" };
            context.push_str(&format!(
                "\n\nThe user has read {} chapter(s) from this book: {}{}. \
They may be familiar with content from these chapters.",
                count, listed, ellipsis
            ));
        }

        context
    }
}

/// Loads preference rows and turns them into prompt modifiers.
pub struct PersonalizationService {
    repo: Arc<Repository>,
}

impl PersonalizationService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn get_user_context(
        &self,
        user_id: Option<&str>,
    ) -> Result<Option<PersonalizationContext>, ApiError> {
        let user_id = match user_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let prefs = self
            .repo
            .get_preferences(user_id)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        Ok(prefs.map(|p| PersonalizationContext {
            experience_level: ExperienceLevel::parse(&p.experience_level),
            chapters_read: p.chapters(),
        }))
    }

    pub fn generate_prompt_modifier(&self, context: Option<&PersonalizationContext>) -> String {
        match context {
            Some(ctx) => ctx.to_prompt_context(),
            None => ANONYMOUS_MODIFIER.to_string(),
        }
    }

    pub async fn track_chapter_read(
        &self,
        user_id: &str,
        chapter_slug: &str,
    ) -> Result<(), ApiError> {
        self.repo
            .add_chapter_read(user_id, chapter_slug)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))
    }
}
