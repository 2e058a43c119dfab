use crate::config::QdrantConfig;
use crate::services::VectorSearchProvider;
use crate::utils::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Payload stored alongside each vector in the book collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub content: String,
    pub chapter_slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    pub ordinal: usize,
}

/// One search hit with its cosine similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f32,
    pub payload: ChunkPayload,
}

#[derive(Serialize)]
pub struct IndexPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: ChunkPayload,
}

#[derive(Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Deserialize)]
pub struct CollectionInfo {
    #[serde(default)]
    pub points_count: u64,
}

/// Thin REST client for the Qdrant collection holding the book chunks.
#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    config: QdrantConfig,
}

impl QdrantIndex {
    pub fn new(config: QdrantConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            builder
        } else {
            builder.header("api-key", &self.config.api_key)
        }
    }

    async fn check(&self, response: reqwest::Response, op: &str) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(ApiError::UpstreamUnavailable(format!(
            "Qdrant {} failed ({}): {}",
            op, status, text
        )))
    }

    /// Creates the collection if it does not exist yet. Existing collections
    /// are left untouched.
    pub async fn ensure_collection(&self) -> Result<(), ApiError> {
        let url = self.url(&format!("/collections/{}", self.config.collection_name));

        let exists = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?
            .status()
            .is_success();

        if exists {
            debug!("Collection '{}' already exists", self.config.collection_name);
            return Ok(());
        }

        let body = json!({
            "vectors": {
                "size": self.config.vector_dimension,
                "distance": "Cosine",
            }
        });

        let response = self
            .request(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?;

        self.check(response, "create collection").await?;
        info!("Created collection '{}'", self.config.collection_name);
        Ok(())
    }

    pub async fn upsert(&self, points: Vec<IndexPoint>) -> Result<(), ApiError> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();

        let url = self.url(&format!(
            "/collections/{}/points?wait=true",
            self.config.collection_name
        ));

        let response = self
            .request(self.client.put(&url))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?;

        self.check(response, "upsert").await?;
        debug!("Upserted {} points", count);
        Ok(())
    }

    /// Drops and recreates the collection.
    pub async fn recreate_collection(&self) -> Result<(), ApiError> {
        let url = self.url(&format!("/collections/{}", self.config.collection_name));

        let response = self
            .request(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?;
        // 404 here just means there was nothing to drop
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return self.check(response, "drop collection").await.map(|_| ());
        }

        self.ensure_collection().await
    }

    pub async fn info(&self) -> Result<CollectionInfo, ApiError> {
        let url = self.url(&format!("/collections/{}", self.config.collection_name));

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?;

        let response = self.check(response, "info").await?;
        let body: CollectionInfoResponse = response.json().await.map_err(|e| {
            ApiError::UpstreamUnavailable(format!("Failed to parse Qdrant response: {}", e))
        })?;
        Ok(body.result)
    }
}

#[async_trait]
impl VectorSearchProvider for QdrantIndex {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        chapter_filter: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, ApiError> {
        let url = self.url(&format!(
            "/collections/{}/points/search",
            self.config.collection_name
        ));

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        if let Some(slug) = chapter_filter {
            body["filter"] = json!({
                "must": [
                    { "key": "chapter_slug", "match": { "value": slug } }
                ]
            });
        }

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::UpstreamUnavailable(format!("Qdrant network error: {}", e)))?;

        let response = self.check(response, "search").await?;
        let body: SearchResponse = response.json().await.map_err(|e| {
            ApiError::UpstreamUnavailable(format!("Failed to parse Qdrant response: {}", e))
        })?;

        Ok(body
            .result
            .into_iter()
            .map(|hit| ScoredChunk {
                score: hit.score,
                payload: hit.payload,
            })
            .collect())
    }
}
