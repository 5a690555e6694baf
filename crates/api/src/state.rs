use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use extract::{EntityExtractor, ExtractionStrategy, RelationExtractor};
use index::{
    Embedder, GraphStore, HashEmbedder, Indexer, MemoryGraphStore, MemoryVectorStore,
    Neo4jStore, OllamaEmbedder, QdrantStore, VectorIndex, VectorStore,
};
use ingest::Segmenter;
use query::{ProviderRegistry, RagEngine, RetryPolicy, Retriever};

use crate::cache::{CachedEmbedder, EmbeddingCache};
use crate::config::{AppConfig, EmbedderKind, GraphBackend, VectorBackend};
use crate::documents::DocumentRegistry;
use crate::error::ApiError;
use crate::metrics::Metrics;

/// Shared by every handler. Optional parts are `None` when their backend
/// is disabled or was unreachable at startup.
pub struct AppState {
    pub config: AppConfig,
    pub segmenter: Segmenter,
    pub entity_extractor: EntityExtractor,
    pub relation_extractor: RelationExtractor,
    pub indexer: Indexer,
    pub retriever: Option<Retriever>,
    pub rag: Option<RagEngine>,
    pub registry: Arc<ProviderRegistry>,
    pub documents: DocumentRegistry,
    pub cache: Option<Arc<EmbeddingCache>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub async fn build(config: AppConfig) -> Result<Self> {
        let retry = RetryPolicy::from_config(&config.retry);
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(EmbeddingCache::new(config.cache.max_entries)));

        let vector = connect_vector(&config, cache.clone(), retry.clone()).await;
        let graph = connect_graph(&config).await;

        let registry = Arc::new(ProviderRegistry::new());
        configure_providers(&registry, &config).await;

        let entity_extractor = match config.extraction.strategy {
            ExtractionStrategy::Rules => EntityExtractor::rules(),
            ExtractionStrategy::Model => EntityExtractor::model(
                &config.extraction.model_url,
                &config.extraction.model_name,
            ),
        };

        Ok(Self::assemble(
            config,
            entity_extractor,
            vector,
            graph,
            registry,
            cache,
        ))
    }

    /// Wire the parts together. Used directly by tests with in-memory stores.
    pub fn assemble(
        config: AppConfig,
        entity_extractor: EntityExtractor,
        vector: Option<VectorIndex>,
        graph: Option<Arc<dyn GraphStore>>,
        registry: Arc<ProviderRegistry>,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Self {
        let retriever = vector.clone().map(Retriever::new);
        let rag = retriever.clone().map(|retriever| {
            RagEngine::new(retriever, registry.clone())
                .with_retry(RetryPolicy::from_config(&config.retry))
                .with_semantic_weight(config.retrieval.semantic_weight)
        });

        Self {
            segmenter: Segmenter::new(config.segmenter.clone()),
            relation_extractor: RelationExtractor::new(config.extraction.relation_config()),
            entity_extractor,
            indexer: Indexer::new(vector, graph),
            retriever,
            rag,
            registry,
            documents: DocumentRegistry::new(),
            cache,
            metrics: Metrics::new(),
            config,
        }
    }

    pub fn graph(&self) -> Result<&Arc<dyn GraphStore>, ApiError> {
        self.indexer
            .graph()
            .ok_or(ApiError::Unavailable("Knowledge Graph"))
    }

    pub fn retriever(&self) -> Result<&Retriever, ApiError> {
        self.retriever
            .as_ref()
            .ok_or(ApiError::Unavailable("Vector Store"))
    }

    pub fn rag(&self) -> Result<&RagEngine, ApiError> {
        self.rag.as_ref().ok_or(ApiError::Unavailable("RAG Engine"))
    }
}

async fn connect_vector(
    config: &AppConfig,
    cache: Option<Arc<EmbeddingCache>>,
    retry: RetryPolicy,
) -> Option<VectorIndex> {
    let base: Arc<dyn Embedder> = match config.vector.embedder {
        EmbedderKind::Ollama => Arc::new(OllamaEmbedder::new(
            &config.vector.embedding_url,
            &config.vector.embedding_model,
        )),
        EmbedderKind::Hash => Arc::new(HashEmbedder::default()),
    };
    let embedder: Arc<dyn Embedder> = Arc::new(CachedEmbedder::new(base, cache, retry));

    let store: Arc<dyn VectorStore> = match config.vector.backend {
        VectorBackend::Memory => Arc::new(MemoryVectorStore::new()),
        VectorBackend::Qdrant => {
            let store = QdrantStore::new(&config.vector.url, &config.vector.collection);
            let ready = async {
                let dimension = embedder.dimension().await?;
                store.init_collection(dimension).await
            };
            if let Err(e) = ready.await {
                warn!(url = %config.vector.url, error = %format!("{:#}", e), "Vector store unavailable");
                return None;
            }
            Arc::new(store)
        }
    };

    info!(backend = store.backend(), embedder = embedder.name(), "Vector store ready");
    Some(VectorIndex::new(store, embedder))
}

async fn connect_graph(config: &AppConfig) -> Option<Arc<dyn GraphStore>> {
    let store: Arc<dyn GraphStore> = match config.graph.backend {
        GraphBackend::Disabled => {
            info!("Knowledge graph disabled");
            return None;
        }
        GraphBackend::Memory => Arc::new(MemoryGraphStore::new()),
        GraphBackend::Neo4j => {
            match Neo4jStore::connect(&config.graph.uri, &config.graph.user, &config.graph.password)
                .await
            {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(uri = %config.graph.uri, error = %format!("{:#}", e), "Knowledge graph unavailable");
                    return None;
                }
            }
        }
    };

    if let Err(e) = store.init_schema().await {
        warn!(error = %format!("{:#}", e), "Knowledge graph schema setup failed");
        return None;
    }
    info!(backend = store.backend(), "Knowledge graph ready");
    Some(store)
}

/// Providers from the config file first, then any key found in the
/// environment for a provider the file did not mention.
async fn configure_providers(registry: &ProviderRegistry, config: &AppConfig) {
    for provider in &config.llm.providers {
        if let Err(e) = registry
            .configure(&provider.id, &provider.api_key, provider.model.as_deref())
            .await
        {
            warn!(provider = %provider.id, error = %e, "Ignoring configured LLM provider");
        }
    }

    for spec in query::CATALOGUE {
        let already = config.llm.providers.iter().any(|p| p.id == spec.id);
        let Some(key) = spec.env_key.and_then(|var| std::env::var(var).ok()) else {
            continue;
        };
        if already || key.trim().is_empty() {
            continue;
        }
        if let Err(e) = registry.configure(spec.id, &key, None).await {
            warn!(provider = spec.id, error = %e, "Ignoring LLM provider from environment");
        }
    }

    if let Some(default) = &config.llm.default_provider {
        if let Err(e) = registry.switch(default, None).await {
            warn!(provider = %default, error = %e, "Default LLM provider not available");
        }
    }

    let current = registry.current().await;
    info!(provider = %current.provider, model = %current.model, "LLM provider selection");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    /// In-memory stores, hashing embedder, no LLM provider.
    pub(crate) fn test_state(upload_dir: &Path) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.server.upload_dir = upload_dir.to_string_lossy().into_owned();
        config.retry.max_retries = 0;

        let vector = VectorIndex::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        );
        Arc::new(AppState::assemble(
            config,
            EntityExtractor::rules(),
            Some(vector),
            Some(Arc::new(MemoryGraphStore::new())),
            Arc::new(ProviderRegistry::new()),
            None,
        ))
    }

    #[test]
    fn test_missing_backends_report_unavailable() {
        let state = AppState::assemble(
            AppConfig::default(),
            EntityExtractor::rules(),
            None,
            None,
            Arc::new(ProviderRegistry::new()),
            None,
        );
        assert!(matches!(state.graph(), Err(ApiError::Unavailable("Knowledge Graph"))));
        assert!(matches!(state.retriever(), Err(ApiError::Unavailable("Vector Store"))));
        assert!(state.rag().is_err());
    }
}
