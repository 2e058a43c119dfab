pub mod auth;
pub mod config;
pub mod database;
pub mod document;
pub mod handlers;
pub mod models;
pub mod security;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};

use state::AppState;

/// Assembles the HTTP surface: health probes stay outside the rate
/// limiter, everything under /api goes through it.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/chat", post(handlers::chat::chat_handler))
        .route(
            "/api/chat/selected",
            post(handlers::chat::chat_selected_handler),
        )
        .route(
            "/api/chat/conversations",
            get(handlers::chat::list_conversations_handler),
        )
        .route(
            "/api/chat/conversations/{conversation_id}",
            get(handlers::chat::get_conversation_handler),
        )
        .route(
            "/api/translate/{chapter_slug}",
            get(handlers::translate::get_translation_handler)
                .post(handlers::translate::request_translation_handler),
        )
        .route(
            "/api/translate/{chapter_slug}/progress",
            get(handlers::translate::translation_progress_handler),
        )
        .route(
            "/api/preferences",
            get(handlers::preferences::get_preferences_handler)
                .put(handlers::preferences::update_preferences_handler),
        )
        .route(
            "/api/preferences/chapters/{chapter_slug}/read",
            post(handlers::preferences::track_chapter_handler),
        );

    let cors = cors_layer(&state.settings.server.cors_origins);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::middleware::rate_limit_middleware,
        ))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    match parse_origins(origins) {
        Some(origins) => CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

/// `None` means every origin is allowed (empty list or a `*` entry).
/// Entries that are not valid header values are skipped.
fn parse_origins(origins: &[String]) -> Option<Vec<HeaderValue>> {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return None;
    }
    Some(origins.iter().filter_map(|o| o.parse().ok()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_or_wildcard_origins_allow_everything() {
        assert!(parse_origins(&[]).is_none());
        assert!(parse_origins(&["*".to_string()]).is_none());
        assert!(
            parse_origins(&["http://localhost:3000".to_string(), "*".to_string()]).is_none()
        );
    }

    #[test]
    fn test_explicit_origins_are_parsed() {
        let origins = parse_origins(&[
            "http://localhost:3000".to_string(),
            "https://book.example.com".to_string(),
        ])
        .unwrap();
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://localhost:3000");
    }

    #[test]
    fn test_invalid_origin_entries_are_skipped() {
        let origins = parse_origins(&["http://ok.example\u{0}bad".to_string()]).unwrap();
        assert!(origins.is_empty());
    }
}
