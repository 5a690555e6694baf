use anyhow::Result;
use tracing::debug;

use index::{MetadataFilter, RetrievedResult, VectorIndex};

use crate::fusion::fuse;

/// Semantic and hybrid search over a vector index.
#[derive(Clone)]
pub struct Retriever {
    index: VectorIndex,
}

impl Retriever {
    pub fn new(index: VectorIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedResult>> {
        let filter = document_id.map(MetadataFilter::document);
        self.index.search(query, top_k, filter.as_ref()).await
    }

    /// Over-fetch `2 * top_k` semantic candidates, then rank by the
    /// blended score.
    pub async fn hybrid_search(
        &self,
        query: &str,
        top_k: usize,
        semantic_weight: f32,
    ) -> Result<Vec<RetrievedResult>> {
        self.hybrid(query, top_k, semantic_weight, None).await
    }

    /// Hybrid search restricted to one document. The restriction applies
    /// to the candidate fetch, before any ranking.
    pub async fn hybrid_search_in_document(
        &self,
        query: &str,
        document_id: &str,
        top_k: usize,
        semantic_weight: f32,
    ) -> Result<Vec<RetrievedResult>> {
        let filter = MetadataFilter::document(document_id);
        self.hybrid(query, top_k, semantic_weight, Some(&filter))
            .await
    }

    async fn hybrid(
        &self,
        query: &str,
        top_k: usize,
        semantic_weight: f32,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedResult>> {
        let candidates = self.index.search(query, top_k * 2, filter).await?;
        let fetched = candidates.len();
        let results = fuse(candidates, query, semantic_weight, top_k);
        debug!(fetched, returned = results.len(), semantic_weight, "hybrid search");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{HashEmbedder, Metadata, MemoryVectorStore};
    use ingest::Chunk;
    use std::sync::Arc;

    async fn retriever() -> Retriever {
        let index = VectorIndex::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        );
        let chunks = [
            ("a", "Rust 编写的 知识图谱 服务"),
            ("a", "向量 检索 与 关键词 检索 结合"),
            ("b", "知识图谱 可视化 工具"),
            ("b", "天气 晴朗 适合 出游"),
        ];
        for (i, (doc, text)) in chunks.iter().enumerate() {
            let chunk = Chunk::new(doc, i, text.to_string(), 0, text.chars().count());
            index.add_chunks(&[chunk], &Metadata::new()).await.unwrap();
        }
        Retriever::new(index)
    }

    #[tokio::test]
    async fn test_hybrid_returns_at_most_top_k_with_scores() {
        let retriever = retriever().await;
        let results = retriever.hybrid_search("知识图谱", 2, 0.7).await.unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.keyword_score.is_some());
            assert!(r.combined_score.is_some());
        }
        assert!(results.iter().all(|r| r.text.contains("知识图谱")));
    }

    #[tokio::test]
    async fn test_document_scope_filters_before_ranking() {
        let retriever = retriever().await;
        let results = retriever
            .hybrid_search_in_document("知识图谱", "b", 1, 0.7)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id(), Some("b"));
        assert!(results[0].text.contains("知识图谱"));

        let plain = retriever.search("检索", 5, Some("a")).await.unwrap();
        assert!(plain.iter().all(|r| r.document_id() == Some("a")));
        assert_eq!(plain.len(), 2);
    }
}
