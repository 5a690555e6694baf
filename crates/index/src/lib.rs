pub mod embeddings;
pub mod graph;
pub mod graph_store;
pub mod neo4j_store;
pub mod qdrant_store;
pub mod subgraph;
pub mod vector;
pub mod vector_store;

pub use embeddings::{Embedder, HashEmbedder, OllamaEmbedder};
pub use graph::{DocumentNode, GraphEdge, GraphNode, GraphStats, Subgraph, entity_id};
pub use graph_store::{GraphStore, MemoryGraphStore};
pub use neo4j_store::Neo4jStore;
pub use qdrant_store::QdrantStore;
pub use subgraph::induced_subgraph;
pub use vector::{RetrievedResult, VectorIndex, VectorStats};
pub use vector_store::{Metadata, MetadataFilter, MemoryVectorStore, StoredItem, VectorStore};

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use extract::{Entity, Relation};
use ingest::Chunk;

/// Result of one indexing stage. Stages run independently, so one failing
/// never prevents the other.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Indexed { count: usize },
    Skipped,
    Failed { error: String },
}

impl StageOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, StageOutcome::Indexed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub vector: StageOutcome,
    pub graph: StageOutcome,
}

/// Everything produced for one document that needs indexing.
pub struct DocumentBundle<'a> {
    pub document: &'a DocumentNode,
    pub chunks: &'a [Chunk],
    pub chunk_metadata: &'a Metadata,
    pub entities: &'a [Entity],
    pub relations: &'a [Relation],
}

/// Unified indexer over the vector index and graph store. Either side may
/// be absent when its backend is disabled or unreachable.
#[derive(Clone)]
pub struct Indexer {
    vector: Option<VectorIndex>,
    graph: Option<Arc<dyn GraphStore>>,
}

impl Indexer {
    pub fn new(vector: Option<VectorIndex>, graph: Option<Arc<dyn GraphStore>>) -> Self {
        Self { vector, graph }
    }

    pub fn vector(&self) -> Option<&VectorIndex> {
        self.vector.as_ref()
    }

    pub fn graph(&self) -> Option<&Arc<dyn GraphStore>> {
        self.graph.as_ref()
    }

    pub async fn index_document(&self, bundle: DocumentBundle<'_>) -> IndexOutcome {
        let document_id = bundle.document.id.as_str();

        let vector = match &self.vector {
            None => StageOutcome::Skipped,
            Some(index) => match index.add_chunks(bundle.chunks, bundle.chunk_metadata).await {
                Ok(count) => StageOutcome::Indexed { count },
                Err(e) => {
                    warn!(document_id, error = %e, "vector indexing failed");
                    StageOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            },
        };

        let graph = match &self.graph {
            None => StageOutcome::Skipped,
            Some(store) => match index_graph(store.as_ref(), &bundle).await {
                Ok(count) => StageOutcome::Indexed { count },
                Err(e) => {
                    warn!(document_id, error = %e, "graph indexing failed");
                    StageOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            },
        };

        info!(document_id, ?vector, ?graph, "indexed document");
        IndexOutcome { vector, graph }
    }

    /// Remove a document from both sides. Each side reports separately.
    pub async fn delete_document(&self, document_id: &str) -> IndexOutcome {
        let vector = match &self.vector {
            None => StageOutcome::Skipped,
            Some(index) => match index.delete_document(document_id).await {
                Ok(count) => StageOutcome::Indexed { count },
                Err(e) => StageOutcome::Failed {
                    error: format!("{:#}", e),
                },
            },
        };
        let graph = match &self.graph {
            None => StageOutcome::Skipped,
            Some(store) => match store.delete_document(document_id).await {
                Ok(found) => StageOutcome::Indexed {
                    count: usize::from(found),
                },
                Err(e) => StageOutcome::Failed {
                    error: format!("{:#}", e),
                },
            },
        };
        IndexOutcome { vector, graph }
    }
}

async fn index_graph(store: &dyn GraphStore, bundle: &DocumentBundle<'_>) -> anyhow::Result<usize> {
    store.create_document(bundle.document).await?;
    let entities = store
        .add_mentions(&bundle.document.id, bundle.entities)
        .await?;
    let relations = store.add_relations(bundle.relations).await?;
    Ok(entities + relations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extract::{Predicate, label};

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("embedding service down")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn bundle_parts() -> (DocumentNode, Vec<Chunk>, Vec<Entity>, Vec<Relation>) {
        let document = DocumentNode {
            id: "d1".into(),
            file_name: "d1.txt".into(),
            ..Default::default()
        };
        let chunks = vec![Chunk::new("d1", 0, "Rust支持WebAssembly".into(), 0, 16)];
        let entities = vec![
            Entity::new("Rust", label::TECH, 0, 4, 0.9),
            Entity::new("API", label::TECH, 6, 9, 0.9),
        ];
        let relations = vec![Relation {
            subject: "Rust".into(),
            predicate: Predicate::Supports,
            object: "API".into(),
            confidence: 0.85,
            evidence: "Rust支持API".into(),
        }];
        (document, chunks, entities, relations)
    }

    #[tokio::test]
    async fn test_graph_stage_survives_vector_failure() {
        let graph: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let vector = VectorIndex::new(Arc::new(MemoryVectorStore::new()), Arc::new(FailingEmbedder));
        let indexer = Indexer::new(Some(vector), Some(graph.clone()));

        let (document, chunks, entities, relations) = bundle_parts();
        let outcome = indexer
            .index_document(DocumentBundle {
                document: &document,
                chunks: &chunks,
                chunk_metadata: &Metadata::new(),
                entities: &entities,
                relations: &relations,
            })
            .await;

        assert!(matches!(outcome.vector, StageOutcome::Failed { .. }));
        assert_eq!(outcome.graph, StageOutcome::Indexed { count: 3 });
        let subgraph = graph.document_graph("d1").await.unwrap().unwrap();
        assert_eq!(subgraph.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_graph_is_skipped() {
        let vector = VectorIndex::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        );
        let indexer = Indexer::new(Some(vector), None);
        let (document, chunks, entities, relations) = bundle_parts();
        let outcome = indexer
            .index_document(DocumentBundle {
                document: &document,
                chunks: &chunks,
                chunk_metadata: &Metadata::new(),
                entities: &entities,
                relations: &relations,
            })
            .await;
        assert_eq!(outcome.vector, StageOutcome::Indexed { count: 1 });
        assert_eq!(outcome.graph, StageOutcome::Skipped);

        let deleted = indexer.delete_document("d1").await;
        assert_eq!(deleted.vector, StageOutcome::Indexed { count: 1 });
    }
}
