use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TranslationRequest {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub content: Option<String>,
}

fn default_language() -> String {
    "ur".to_string()
}

#[derive(Debug, Serialize)]
pub struct TranslationResponse {
    pub chapter_slug: String,
    pub language: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct TranslationPendingResponse {
    pub chapter_slug: String,
    pub language: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TranslationProgressResponse {
    pub chapter_slug: String,
    pub language: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub experience_level: String,
    #[serde(default = "default_preferred_language")]
    pub preferred_language: String,
}

fn default_preferred_language() -> String {
    "en".to_string()
}

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub experience_level: String,
    pub preferred_language: String,
    pub chapters_read: Vec<String>,
}
