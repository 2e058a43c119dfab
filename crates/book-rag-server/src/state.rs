use std::sync::Arc;

use crate::auth::JwtManager;
use crate::config::Settings;
use crate::database::Repository;
use crate::security::RateLimiter;
use crate::services::agent_service::AgentService;
use crate::services::personalization_service::PersonalizationService;
use crate::services::translation_service::TranslationService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub agent_service: Arc<AgentService>,
    pub translation_service: Arc<TranslationService>,
    pub personalization_service: Arc<PersonalizationService>,
    pub jwt: Arc<JwtManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: Settings,
}
