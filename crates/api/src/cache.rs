use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use index::Embedder;
use query::RetryPolicy;

/// Query embeddings keyed by the SHA-256 of the text.
pub struct EmbeddingCache {
    embeddings: DashMap<String, Vec<f32>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            embeddings: DashMap::new(),
            max_entries,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let found = self
            .embeddings
            .get(&hash_text(text))
            .map(|r| r.value().clone());
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, text: &str, embedding: Vec<f32>) {
        if self.max_entries == 0 {
            return;
        }
        if self.embeddings.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .embeddings
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.embeddings.remove(&key);
            }
        }
        self.embeddings.insert(hash_text(text), embedding);
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            embeddings_cached: self.embeddings.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub embeddings_cached: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Wraps an encoder with retries and an optional query-embedding cache.
/// Batch calls (document indexing) are retried but never cached.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Option<Arc<EmbeddingCache>>,
    retry: RetryPolicy,
}

impl CachedEmbedder {
    pub fn new(
        inner: Arc<dyn Embedder>,
        cache: Option<Arc<EmbeddingCache>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner,
            cache,
            retry,
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(text)) {
            return Ok(hit);
        }
        let embedding = self.retry.retry("embed", || self.inner.embed(text)).await?;
        if let Some(cache) = &self.cache {
            cache.insert(text, embedding.clone());
        }
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.retry
            .retry("embed_batch", || self.inner.embed_batch(texts))
            .await
    }

    async fn dimension(&self) -> Result<usize> {
        self.retry.retry("dimension", || self.inner.dimension()).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::HashEmbedder;

    struct Counting {
        inner: HashEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for Counting {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_eviction_keeps_cache_bounded() {
        let cache = EmbeddingCache::new(8);
        for i in 0..20 {
            cache.insert(&format!("query {i}"), vec![i as f32]);
            assert!(cache.len() <= 8);
        }
        assert!(cache.get("query 19").is_some());
    }

    #[tokio::test]
    async fn test_repeated_queries_hit_cache() {
        let inner = Arc::new(Counting {
            inner: HashEmbedder::new(16),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(EmbeddingCache::new(100));
        let embedder = CachedEmbedder::new(inner.clone(), Some(cache.clone()), RetryPolicy::none());

        let first = embedder.embed("知识图谱").await.unwrap();
        let second = embedder.embed("知识图谱").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(embedder.name(), "counting");
    }
}
