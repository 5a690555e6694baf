use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use ingest::Chunk;

use crate::embeddings::Embedder;
use crate::vector_store::{
    CHUNK_INDEX_KEY, DOCUMENT_ID_KEY, Metadata, MetadataFilter, StoredItem, VectorStore,
};

/// One retrieval hit. `score` is `1 - distance`; the fused scores are only
/// set by hybrid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_score: Option<f32>,
}

impl RetrievedResult {
    pub fn document_id(&self) -> Option<&str> {
        self.metadata.get(DOCUMENT_ID_KEY).and_then(Value::as_str)
    }

    /// Score used for ranking: the fused score when present.
    pub fn rank_score(&self) -> f32 {
        self.combined_score.unwrap_or(self.score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStats {
    pub backend: String,
    pub embedder: String,
    pub chunks: usize,
}

/// A vector store paired with the encoder used to fill and query it.
#[derive(Clone)]
pub struct VectorIndex {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed and store chunks. `extra` is merged into every chunk's metadata.
    pub async fn add_chunks(&self, chunks: &[Chunk], extra: &Metadata) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to generate embeddings")?;

        let metadatas: Vec<Metadata> = chunks
            .iter()
            .map(|chunk| {
                let mut metadata = extra.clone();
                metadata.insert(DOCUMENT_ID_KEY.into(), Value::from(chunk.document_id.as_str()));
                metadata.insert(CHUNK_INDEX_KEY.into(), Value::from(chunk.index));
                metadata.insert("start_char".into(), Value::from(chunk.start_char));
                metadata.insert("end_char".into(), Value::from(chunk.end_char));
                metadata
            })
            .collect();

        self.store.add(&ids, &texts, &embeddings, &metadatas).await?;
        info!(chunks = chunks.len(), backend = self.store.backend(), "indexed chunks");
        Ok(chunks.len())
    }

    /// Semantic search, optionally restricted by metadata before ranking.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedResult>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;
        self.search_embedding(&embedding, top_k, filter).await
    }

    /// Search with a precomputed query embedding.
    pub async fn search_embedding(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedResult>> {
        let matches = self.store.query(embedding, top_k, filter).await?;
        debug!(hits = matches.len(), top_k, "vector search");
        Ok(matches
            .into_iter()
            .map(|m| RetrievedResult {
                id: m.id,
                text: m.text,
                metadata: m.metadata,
                score: 1.0 - m.distance,
                keyword_score: None,
                combined_score: None,
            })
            .collect())
    }

    pub async fn search_by_document(
        &self,
        query: &str,
        document_id: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedResult>> {
        self.search(query, top_k, Some(&MetadataFilter::document(document_id)))
            .await
    }

    pub async fn document_chunks(&self, document_id: &str) -> Result<Vec<StoredItem>> {
        self.store.document_chunks(document_id).await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let removed = self.store.delete_document(document_id).await?;
        info!(document_id, removed, "deleted document chunks");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<VectorStats> {
        Ok(VectorStats {
            backend: self.store.backend().to_string(),
            embedder: self.embedder.name().to_string(),
            chunks: self.store.count().await?,
        })
    }
}
