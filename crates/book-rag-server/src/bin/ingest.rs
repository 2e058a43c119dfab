//! Indexes book chapters (markdown files) into the Qdrant collection.
//!
//! Usage: `ingest --source ./book/chapters [--clear]`

use anyhow::{bail, Context, Result};
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

use book_rag_server::config::Settings;
use book_rag_server::document::{ChunkMetadata, TokenChunker};
use book_rag_server::services::gemini::GeminiClient;
use book_rag_server::services::qdrant::QdrantIndex;
use book_rag_server::services::embedding_service::EmbeddingService;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Ingest book content into the vector index")]
struct Args {
    /// Directory containing markdown chapter files
    #[arg(long)]
    source: PathBuf,

    /// Drop and recreate the collection before ingesting
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let args = Args::parse();
    if !args.source.is_dir() {
        bail!("Source directory does not exist: {}", args.source.display());
    }

    let settings = Settings::load()?;

    let chunker = TokenChunker::new(settings.rag.chunk_size, settings.rag.chunk_overlap)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let gemini = Arc::new(GeminiClient::new(settings.gemini.clone()));
    let qdrant = QdrantIndex::new(settings.qdrant.clone());

    if args.clear {
        info!("Recreating collection");
        qdrant.recreate_collection().await?;
    } else {
        qdrant.ensure_collection().await?;
    }

    let service = EmbeddingService::new(chunker, gemini, qdrant.clone());

    let files = find_markdown_files(&args.source);
    if files.is_empty() {
        warn!("No markdown files found in {}", args.source.display());
        return Ok(());
    }
    info!("Found {} markdown files", files.len());

    let title_re = Regex::new(r"(?m)^#\s+(.+)$")?;

    let mut total_chunks = 0;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        if content.trim().is_empty() {
            info!("Skipping empty file: {}", file.display());
            continue;
        }

        let metadata = chapter_metadata(file, &content, &title_re);
        info!("Processing '{}' ({})", metadata.title, metadata.chapter_slug);

        let count = service
            .index_chapter(&content, metadata)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        total_chunks += count;
    }

    let collection = qdrant.info().await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!(
        "Ingestion complete: {} chunks from {} files, {} points in collection",
        total_chunks,
        files.len(),
        collection.points_count
    );

    Ok(())
}

/// Markdown files under the source tree, skipping underscore-prefixed
/// files (index pages, templates).
fn find_markdown_files(source: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(source)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension().map(|ext| ext == "md").unwrap_or(false)
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('_'))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Slug combines the parent directory and the file stem so chapters with
/// the same filename in different parts do not collide. The title comes
/// from the first H1 heading, falling back to a prettified stem.
fn chapter_metadata(path: &Path, content: &str, title_re: &Regex) -> ChunkMetadata {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chapter");
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .unwrap_or("book");
    let slug = format!("{}_{}", parent, stem);

    let title = title_re
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| titlecase_stem(stem));

    ChunkMetadata {
        chapter_slug: slug,
        title,
        section: None,
        page: None,
    }
}

fn titlecase_stem(stem: &str) -> String {
    stem.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
