use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::embeddings::cosine_similarity;

pub type Metadata = serde_json::Map<String, Value>;

pub const DOCUMENT_ID_KEY: &str = "document_id";
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Conjunction of equality conditions on metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn document(document_id: &str) -> Self {
        Self::default().with(DOCUMENT_ID_KEY, Value::from(document_id))
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.equals.push((key.to_string(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A query hit. Smaller distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace items. All slices must have equal length.
    async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<()>;

    /// Nearest items by cosine distance. The filter applies before ranking.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;

    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<StoredItem>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn count(&self) -> Result<usize>;

    fn backend(&self) -> &'static str;

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let ids: Vec<String> = self
            .get(&MetadataFilter::document(document_id))
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect();
        if !ids.is_empty() {
            self.delete(&ids).await?;
        }
        Ok(ids.len())
    }

    /// Chunks of one document in segmentation order.
    async fn document_chunks(&self, document_id: &str) -> Result<Vec<StoredItem>> {
        let mut items = self.get(&MetadataFilter::document(document_id)).await?;
        items.sort_by_key(|item| {
            item.metadata
                .get(CHUNK_INDEX_KEY)
                .and_then(Value::as_u64)
                .unwrap_or(u64::MAX)
        });
        Ok(items)
    }
}

pub(crate) fn check_lengths(
    ids: &[String],
    texts: &[String],
    embeddings: &[Vec<f32>],
    metadatas: &[Metadata],
) -> Result<()> {
    let n = ids.len();
    if texts.len() != n || embeddings.len() != n || metadatas.len() != n {
        anyhow::bail!(
            "mismatched batch: {} ids, {} texts, {} embeddings, {} metadatas",
            n,
            texts.len(),
            embeddings.len(),
            metadatas.len()
        );
    }
    Ok(())
}

struct Record {
    item: StoredItem,
    embedding: Vec<f32>,
}

/// In-process store with exact cosine search.
#[derive(Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<()> {
        check_lengths(ids, texts, embeddings, metadatas)?;
        let mut records = self.records.write().await;
        for (((id, text), embedding), metadata) in ids.iter().zip(texts).zip(embeddings).zip(metadatas) {
            let record = Record {
                item: StoredItem {
                    id: id.clone(),
                    text: text.clone(),
                    metadata: metadata.clone(),
                },
                embedding: embedding.clone(),
            };
            match records.iter_mut().find(|r| r.item.id == *id) {
                Some(existing) => *existing = record,
                None => records.push(record),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let records = self.records.read().await;
        let mut matches: Vec<VectorMatch> = records
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.item.metadata)))
            .map(|r| VectorMatch {
                id: r.item.id.clone(),
                text: r.item.text.clone(),
                metadata: r.item.metadata.clone(),
                distance: 1.0 - cosine_similarity(embedding, &r.embedding),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<StoredItem>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| filter.matches(&r.item.metadata))
            .map(|r| r.item.clone())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut records = self.records.write().await;
        records.retain(|r| !ids.contains(&r.item.id));
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
