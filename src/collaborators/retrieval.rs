//! Similarity search over pre-built document indexes stored on disk.
//!
//! Each corpus is one JSON file `<index_dir>/<corpus_id>.json` holding
//! `[{"text": "...", "embedding": [f32, ...]}, ...]`. Building those files is
//! someone else's job; this module only loads and queries them.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::Retriever;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Query embeddings from Ollama's /api/embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                service: "ollama-embeddings".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        if parsed.embedding.is_empty() {
            return Err(CollaboratorError::Parse {
                message: "empty embedding".to_string(),
            });
        }
        Ok(parsed.embedding)
    }
}

pub struct EmbeddingIndexRetriever {
    index_dir: PathBuf,
    embedder: OllamaEmbedder,
    loaded: RwLock<HashMap<String, Arc<Vec<IndexedChunk>>>>,
}

impl EmbeddingIndexRetriever {
    pub fn new(index_dir: impl Into<PathBuf>, embedder: OllamaEmbedder) -> Self {
        Self {
            index_dir: index_dir.into(),
            embedder,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Loads a corpus on first use and keeps it in memory afterwards.
    async fn corpus(&self, corpus_id: &str) -> Result<Arc<Vec<IndexedChunk>>, CollaboratorError> {
        if let Some(chunks) = self.loaded.read().await.get(corpus_id) {
            return Ok(chunks.clone());
        }

        if corpus_id.is_empty() || corpus_id.contains(&['/', '\\', '.'][..]) {
            return Err(CollaboratorError::Unavailable {
                service: "retrieval".to_string(),
                message: format!("invalid corpus id {:?}", corpus_id),
            });
        }

        let path = self.index_dir.join(format!("{}.json", corpus_id));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CollaboratorError::Unavailable {
                service: "retrieval".to_string(),
                message: format!("cannot read index {}: {}", path.display(), e),
            }
        })?;
        let chunks: Vec<IndexedChunk> = serde_json::from_str(&raw)?;
        info!("Loaded {} chunks for corpus {}", chunks.len(), corpus_id);

        let chunks = Arc::new(chunks);
        self.loaded
            .write()
            .await
            .insert(corpus_id.to_string(), chunks.clone());
        Ok(chunks)
    }
}

#[async_trait]
impl Retriever for EmbeddingIndexRetriever {
    #[instrument(skip(self, query), fields(query_chars = query.len()))]
    async fn search(
        &self,
        corpus_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<String, CollaboratorError> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(String::new());
        }
        let chunks = self.corpus(corpus_id).await?;
        let query_embedding = self.embedder.embed(query).await?;
        let hits = rank(&chunks, &query_embedding, top_k);
        debug!(hits = hits.len(), "Retrieved context");
        Ok(hits.join("\n"))
    }
}

/// Texts of the `top_k` chunks most similar to `query`, best first.
pub fn rank<'a>(chunks: &'a [IndexedChunk], query: &[f32], top_k: usize) -> Vec<&'a str> {
    let mut scored: Vec<(f32, &str)> = chunks
        .iter()
        .map(|c| (cosine_similarity(&c.embedding, query), c.text.as_str()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(top_k).map(|(_, text)| text).collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
