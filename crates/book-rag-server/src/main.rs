use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use book_rag_server::auth::JwtManager;
use book_rag_server::build_router;
use book_rag_server::config::Settings;
use book_rag_server::database::{DbPool, Repository};
use book_rag_server::document::TokenChunker;
use book_rag_server::security::RateLimiter;
use book_rag_server::services::agent_service::AgentService;
use book_rag_server::services::gemini::GeminiClient;
use book_rag_server::services::personalization_service::PersonalizationService;
use book_rag_server::services::qdrant::QdrantIndex;
use book_rag_server::services::rag_agent::RagAgent;
use book_rag_server::services::rag_service::RagService;
use book_rag_server::services::translate_agent::TranslateAgent;
use book_rag_server::services::translation_service::TranslationService;
use book_rag_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,book_rag_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("🚀 Starting book RAG server...");

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    info!("✅ Database connection established");

    let repo = Arc::new(Repository::new(db_pool));

    let gemini = Arc::new(GeminiClient::new(settings.gemini.clone()));
    let qdrant = QdrantIndex::new(settings.qdrant.clone());
    qdrant.ensure_collection().await?;
    info!("✅ Vector index ready");

    let rag_service = RagService::new(gemini.clone(), Arc::new(qdrant), settings.rag.clone());
    let rag_agent = RagAgent::new(gemini.clone(), settings.rag.history_limit);
    let personalization = PersonalizationService::new(repo.clone());

    let agent_service = Arc::new(AgentService::new(
        repo.clone(),
        rag_service,
        rag_agent,
        personalization,
    ));

    let translate_agent = TranslateAgent::new(gemini.clone(), settings.translation.clone());
    let translation_service = Arc::new(TranslationService::new(
        repo.clone(),
        translate_agent,
        settings.translation.clone(),
    ));

    // Chunker construction validates the chunk/overlap settings up front.
    TokenChunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let state = AppState {
        repo: repo.clone(),
        agent_service,
        translation_service,
        personalization_service: Arc::new(PersonalizationService::new(repo)),
        jwt: Arc::new(JwtManager::new(&settings.auth.jwt_secret)),
        rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit.clone())),
        settings: settings.clone(),
    };

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
