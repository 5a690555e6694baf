use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::vector_store::{
    Metadata, MetadataFilter, StoredItem, VectorMatch, VectorStore, check_lengths,
};

const ID_FIELD: &str = "_id";
const TEXT_FIELD: &str = "_text";
const SCROLL_PAGE: usize = 256;

/// Qdrant over its REST API. Cosine similarity scores are reported back as
/// distances (`1 - score`).
pub struct QdrantStore {
    base_url: String,
    client: reqwest::Client,
    collection_name: String,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct Point {
    id: u64,
    vector: Vec<f32>,
    payload: Metadata,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionList {
    collections: Vec<CollectionName>,
}

#[derive(Deserialize)]
struct CollectionName {
    name: String,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Metadata,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<RecordPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct RecordPoint {
    #[serde(default)]
    payload: Metadata,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantStore {
    pub fn new(base_url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            collection_name: collection_name.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection_name, path)
    }

    /// Create the collection with cosine distance unless it already exists.
    pub async fn init_collection(&self, dimension: usize) -> Result<()> {
        let url = format!("{}/collections", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to list collections: {}", response.status());
        }

        let info: QdrantResponse<CollectionList> = response.json().await?;
        if info
            .result
            .collections
            .iter()
            .any(|c| c.name == self.collection_name)
        {
            debug!(collection = %self.collection_name, "collection already exists");
            return Ok(());
        }

        let create_req = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine",
            },
        };
        let response = self.client.put(self.url("")).json(&create_req).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to create collection: {}", error_text);
        }

        info!(collection = %self.collection_name, dimension, "created collection");
        Ok(())
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Qdrant request {} failed", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Qdrant {} returned {}: {}", path, status, error_text);
        }

        let parsed: QdrantResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Qdrant {} response", path))?;
        Ok(parsed.result)
    }
}

/// Qdrant point ids must be integers or UUIDs; chunk ids are neither.
pub fn point_id(id: &str) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

fn filter_json(filter: &MetadataFilter) -> Value {
    let must: Vec<Value> = filter
        .equals
        .iter()
        .map(|(key, value)| json!({ "key": key, "match": { "value": value } }))
        .collect();
    json!({ "must": must })
}

fn split_payload(mut payload: Metadata) -> (String, String, Metadata) {
    let id = match payload.remove(ID_FIELD) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let text = match payload.remove(TEXT_FIELD) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    (id, text, payload)
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(
        &self,
        ids: &[String],
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadatas: &[Metadata],
    ) -> Result<()> {
        check_lengths(ids, texts, embeddings, metadatas)?;
        if ids.is_empty() {
            return Ok(());
        }

        let points: Vec<Point> = ids
            .iter()
            .zip(texts)
            .zip(embeddings)
            .zip(metadatas)
            .map(|(((id, text), embedding), metadata)| {
                let mut payload = metadata.clone();
                payload.insert(ID_FIELD.to_string(), Value::from(id.as_str()));
                payload.insert(TEXT_FIELD.to_string(), Value::from(text.as_str()));
                Point {
                    id: point_id(id),
                    vector: embedding.clone(),
                    payload,
                }
            })
            .collect();

        let response = self
            .client
            .put(self.url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await
            .context("Failed to upsert points")?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to upsert points: {}", error_text);
        }

        debug!(points = ids.len(), "upserted points");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let mut body = json!({
            "vector": embedding,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = filter_json(filter);
        }

        let hits: Vec<ScoredPoint> = self.post("/points/search", &body).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let (id, text, metadata) = split_payload(hit.payload);
                VectorMatch {
                    id,
                    text,
                    metadata,
                    distance: 1.0 - hit.score,
                }
            })
            .collect())
    }

    async fn get(&self, filter: &MetadataFilter) -> Result<Vec<StoredItem>> {
        let mut items = Vec::new();
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "limit": SCROLL_PAGE,
                "with_payload": true,
                "with_vector": false,
            });
            if !filter.is_empty() {
                body["filter"] = filter_json(filter);
            }
            if let Some(offset) = offset.take() {
                body["offset"] = offset;
            }

            let page: ScrollResult = self.post("/points/scroll", &body).await?;
            items.extend(page.points.into_iter().map(|point| {
                let (id, text, metadata) = split_payload(point.payload);
                StoredItem { id, text, metadata }
            }));

            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<u64> = ids.iter().map(|id| point_id(id)).collect();
        let _: Value = self
            .post("/points/delete?wait=true", &json!({ "points": points }))
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let result: CountResult = self.post("/points/count", &json!({ "exact": true })).await?;
        Ok(result.count)
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ids_are_stable() {
        assert_eq!(point_id("doc_chunk0"), point_id("doc_chunk0"));
        assert_ne!(point_id("doc_chunk0"), point_id("doc_chunk1"));
    }

    #[test]
    fn test_filter_and_payload_shapes() {
        let filter = MetadataFilter::document("d1");
        assert_eq!(
            filter_json(&filter),
            json!({ "must": [ { "key": "document_id", "match": { "value": "d1" } } ] })
        );

        let mut payload = Metadata::new();
        payload.insert(ID_FIELD.into(), json!("d1_chunk0"));
        payload.insert(TEXT_FIELD.into(), json!("正文"));
        payload.insert("document_id".into(), json!("d1"));
        let (id, text, rest) = split_payload(payload);
        assert_eq!((id.as_str(), text.as_str()), ("d1_chunk0", "正文"));
        assert_eq!(rest.len(), 1);
    }
}
