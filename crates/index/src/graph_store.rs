use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;

use extract::{Entity, Relation};

use crate::graph::{DocumentNode, GraphEdge, GraphNode, GraphStats, Subgraph};
use crate::subgraph::induced_subgraph;

pub const MAX_NEIGHBOR_DEPTH: usize = 5;
pub const MAX_NEIGHBOR_LIMIT: usize = 200;

/// Documents, the entities they mention, and typed relations between
/// entities. Entities are shared nodes keyed by text.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn init_schema(&self) -> Result<()>;

    async fn create_document(&self, document: &DocumentNode) -> Result<()>;

    /// Merge entities by text and link them to the document. Returns the
    /// number of distinct entities linked.
    async fn add_mentions(&self, document_id: &str, entities: &[Entity]) -> Result<usize>;

    /// Merge relation edges between existing entities. Relations whose
    /// endpoints are unknown are skipped. Returns the number written.
    async fn add_relations(&self, relations: &[Relation]) -> Result<usize>;

    /// Entities mentioned by the document and the relations among them
    /// only. `None` when the document is unknown.
    async fn document_graph(&self, document_id: &str) -> Result<Option<Subgraph>>;

    /// Entities within `max_depth` relation hops of `text`, capped at
    /// `limit` neighbours, with the relations among them. `None` when the
    /// entity is unknown.
    async fn entity_neighbors(
        &self,
        text: &str,
        max_depth: usize,
        limit: usize,
    ) -> Result<Option<Subgraph>>;

    async fn search_by_label(&self, label: &str, limit: usize) -> Result<Vec<GraphNode>>;

    async fn stats(&self) -> Result<GraphStats>;

    /// Remove the document, its mentions, and entities no other document
    /// mentions (with their relations). Returns false for unknown ids.
    async fn delete_document(&self, document_id: &str) -> Result<bool>;

    fn backend(&self) -> &'static str;
}

#[derive(Default)]
struct MemoryGraph {
    documents: HashMap<String, DocumentNode>,
    entities: HashMap<String, GraphNode>,
    /// Document id to mentioned entity texts, in first-mention order.
    mentions: HashMap<String, Vec<String>>,
    edges: Vec<GraphEdge>,
}

impl MemoryGraph {
    fn mentioned_anywhere(&self, text: &str) -> bool {
        self.mentions.values().any(|texts| texts.iter().any(|t| t == text))
    }

    fn node(&self, text: &str) -> Option<GraphNode> {
        self.entities.get(text).cloned()
    }
}

/// In-process graph store. Assembles document subgraphs by filtering the
/// edges around the document's entities through `induced_subgraph`.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn create_document(&self, document: &DocumentNode) -> Result<()> {
        let mut graph = self.inner.write().await;
        graph.documents.insert(document.id.clone(), document.clone());
        graph.mentions.entry(document.id.clone()).or_default();
        Ok(())
    }

    async fn add_mentions(&self, document_id: &str, entities: &[Entity]) -> Result<usize> {
        let mut graph = self.inner.write().await;
        if !graph.documents.contains_key(document_id) {
            anyhow::bail!("unknown document {}", document_id);
        }

        for entity in entities {
            graph
                .entities
                .entry(entity.text.clone())
                .or_insert_with(|| GraphNode::from_entity(entity));
        }

        let linked = graph.mentions.entry(document_id.to_string()).or_default();
        for entity in entities {
            if !linked.contains(&entity.text) {
                linked.push(entity.text.clone());
            }
        }
        Ok(linked.len())
    }

    async fn add_relations(&self, relations: &[Relation]) -> Result<usize> {
        let mut graph = self.inner.write().await;
        let mut written = 0;

        for relation in relations {
            if !graph.entities.contains_key(&relation.subject)
                || !graph.entities.contains_key(&relation.object)
            {
                debug!(subject = %relation.subject, object = %relation.object, "skipping relation with unknown endpoint");
                continue;
            }
            let edge = GraphEdge {
                source: relation.subject.clone(),
                target: relation.object.clone(),
                relation: relation.predicate.as_str().to_string(),
                confidence: relation.confidence,
            };
            let existing = graph.edges.iter().position(|e| {
                e.source == edge.source && e.target == edge.target && e.relation == edge.relation
            });
            match existing {
                Some(i) => graph.edges[i].confidence = edge.confidence,
                None => graph.edges.push(edge),
            }
            written += 1;
        }
        Ok(written)
    }

    async fn document_graph(&self, document_id: &str) -> Result<Option<Subgraph>> {
        let graph = self.inner.read().await;
        if !graph.documents.contains_key(document_id) {
            return Ok(None);
        }

        let texts = graph.mentions.get(document_id).cloned().unwrap_or_default();
        let members: Vec<GraphNode> = texts.iter().filter_map(|t| graph.node(t)).collect();

        let touching = graph
            .edges
            .iter()
            .filter(|e| texts.contains(&e.source) || texts.contains(&e.target))
            .cloned();

        Ok(Some(induced_subgraph(members, touching)))
    }

    async fn entity_neighbors(
        &self,
        text: &str,
        max_depth: usize,
        limit: usize,
    ) -> Result<Option<Subgraph>> {
        let graph = self.inner.read().await;
        let Some(center) = graph.node(text) else {
            return Ok(None);
        };

        let mut visited: HashSet<String> = HashSet::from([text.to_string()]);
        let mut members = vec![center];
        let mut queue = VecDeque::from([(text.to_string(), 0)]);

        'bfs: while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for edge in &graph.edges {
                let next = if edge.source == current {
                    &edge.target
                } else if edge.target == current {
                    &edge.source
                } else {
                    continue;
                };
                if !visited.insert(next.clone()) {
                    continue;
                }
                if members.len() > limit {
                    break 'bfs;
                }
                if let Some(node) = graph.node(next) {
                    members.push(node);
                    queue.push_back((next.clone(), depth + 1));
                }
            }
        }
        members.truncate(limit + 1);

        Ok(Some(induced_subgraph(members, graph.edges.iter().cloned())))
    }

    async fn search_by_label(&self, label: &str, limit: usize) -> Result<Vec<GraphNode>> {
        let graph = self.inner.read().await;
        let mut nodes: Vec<GraphNode> = graph
            .entities
            .values()
            .filter(|n| n.label == label)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.text.cmp(&b.text))
        });
        nodes.truncate(limit);
        Ok(nodes)
    }

    async fn stats(&self) -> Result<GraphStats> {
        let graph = self.inner.read().await;
        let mention_edges: usize = graph.mentions.values().map(Vec::len).sum();
        Ok(GraphStats {
            nodes: graph.documents.len() + graph.entities.len(),
            relationships: mention_edges + graph.edges.len(),
            documents: graph.documents.len(),
            entities: graph.entities.len(),
        })
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut graph = self.inner.write().await;
        if graph.documents.remove(document_id).is_none() {
            return Ok(false);
        }

        let texts = graph.mentions.remove(document_id).unwrap_or_default();
        let orphaned: HashSet<String> = texts
            .into_iter()
            .filter(|t| !graph.mentioned_anywhere(t))
            .collect();

        graph.entities.retain(|text, _| !orphaned.contains(text));
        graph
            .edges
            .retain(|e| !orphaned.contains(&e.source) && !orphaned.contains(&e.target));

        debug!(document_id, removed_entities = orphaned.len(), "deleted document from graph");
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
