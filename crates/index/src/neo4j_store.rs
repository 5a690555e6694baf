use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{Graph, Query, Row};
use tracing::{debug, info};

use extract::{Entity, Predicate, Relation};

use crate::graph::{DocumentNode, GraphEdge, GraphNode, GraphStats, Subgraph, entity_id};
use crate::graph_store::{GraphStore, MAX_NEIGHBOR_DEPTH};
use crate::subgraph::induced_subgraph;

const ENTITY_COLUMNS: &str =
    "e.id AS id, e.text AS text, e.label AS label, e.confidence AS confidence";

/// Neo4j-backed graph store. Relation edges are typed by predicate
/// (`DEPENDS_ON`, `RELATED`, ...) and carry confidence and evidence.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        Ok(Self::new(graph))
    }

    pub async fn ping(&self) -> Result<()> {
        self.graph
            .run(neo4rs::query("RETURN 1"))
            .await
            .context("Neo4j ping failed")
    }

    async fn rows(&self, query: Query) -> Result<Vec<Row>> {
        let mut result = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let rows = self.rows(Query::new(cypher.to_string())).await?;
        Ok(rows
            .first()
            .map(|row| row.get::<i64>("count").unwrap_or(0) as usize)
            .unwrap_or(0))
    }

    async fn entity_nodes(&self, query: Query) -> Result<Vec<GraphNode>> {
        Ok(self
            .rows(query)
            .await?
            .iter()
            .filter_map(node_from_row)
            .collect())
    }

    /// Relation edges with both endpoints in `texts`.
    async fn edges_among(&self, texts: &[String]) -> Result<Vec<GraphEdge>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new(
            r#"
            MATCH (a:Entity)-[r]->(b:Entity)
            WHERE a.text IN $texts AND b.text IN $texts
            RETURN a.text AS source, b.text AS target, type(r) AS relation, r.confidence AS confidence
            "#
            .to_string(),
        )
        .param("texts", texts.to_vec());

        Ok(self
            .rows(query)
            .await?
            .iter()
            .filter_map(edge_from_row)
            .collect())
    }
}

fn node_from_row(row: &Row) -> Option<GraphNode> {
    let text: String = row.get("text").unwrap_or_default();
    if text.is_empty() {
        return None;
    }
    Some(GraphNode {
        id: row.get("id").unwrap_or_else(|_| entity_id(&text)),
        label: row.get("label").unwrap_or_default(),
        confidence: row.get::<f64>("confidence").unwrap_or(0.0) as f32,
        text,
    })
}

fn edge_from_row(row: &Row) -> Option<GraphEdge> {
    let source: String = row.get("source").unwrap_or_default();
    let target: String = row.get("target").unwrap_or_default();
    let edge_type: String = row.get("relation").unwrap_or_default();
    if source.is_empty() || target.is_empty() {
        return None;
    }
    Some(GraphEdge {
        source,
        target,
        relation: relation_name(&edge_type),
        confidence: row.get::<f64>("confidence").unwrap_or(0.0) as f32,
    })
}

/// Edge type back to predicate name; unknown types pass through lowercased.
fn relation_name(edge_type: &str) -> String {
    edge_type
        .parse::<Predicate>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|_| edge_type.to_ascii_lowercase())
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT entity_text_unique IF NOT EXISTS FOR (e:Entity) REQUIRE e.text IS UNIQUE",
            "CREATE INDEX entity_label_index IF NOT EXISTS FOR (e:Entity) ON (e.label)",
            "CREATE INDEX document_id_index IF NOT EXISTS FOR (d:Document) ON (d.id)",
        ];
        for statement in statements {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to run schema statement: {}", statement))?;
        }
        info!("Neo4j schema ready");
        Ok(())
    }

    async fn create_document(&self, document: &DocumentNode) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (d:Document {id: $id})
            SET d.file_name = $file_name,
                d.title = $title,
                d.author = $author,
                d.created_at = $created_at
            "#
            .to_string(),
        )
        .param("id", document.id.clone())
        .param("file_name", document.file_name.clone())
        .param("title", document.title.clone())
        .param("author", document.author.clone())
        .param("created_at", document.created_at.clone());

        self.graph
            .run(query)
            .await
            .context("Failed to create document node")?;
        Ok(())
    }

    async fn add_mentions(&self, document_id: &str, entities: &[Entity]) -> Result<usize> {
        let mut linked = std::collections::HashSet::new();
        for entity in entities {
            if !linked.insert(entity.text.as_str()) {
                continue;
            }
            let query = Query::new(
                r#"
                MATCH (d:Document {id: $doc_id})
                MERGE (e:Entity {text: $text})
                ON CREATE SET e.id = $id, e.label = $label, e.confidence = $confidence
                MERGE (d)-[:MENTIONS]->(e)
                "#
                .to_string(),
            )
            .param("doc_id", document_id.to_string())
            .param("text", entity.text.clone())
            .param("id", entity_id(&entity.text))
            .param("label", entity.label.clone())
            .param("confidence", entity.confidence as f64);

            self.graph
                .run(query)
                .await
                .context("Failed to index entity mention")?;
        }
        debug!(document_id, entities = linked.len(), "linked mentions");
        Ok(linked.len())
    }

    async fn add_relations(&self, relations: &[Relation]) -> Result<usize> {
        let mut written = 0;
        for relation in relations {
            // Relationship types cannot be parameters; the type comes from
            // the closed predicate set.
            let cypher = format!(
                r#"
                MATCH (a:Entity {{text: $subject}})
                MATCH (b:Entity {{text: $object}})
                MERGE (a)-[r:{}]->(b)
                SET r.confidence = $confidence, r.evidence = $evidence
                RETURN count(r) AS count
                "#,
                relation.predicate.edge_type()
            );
            let query = Query::new(cypher)
                .param("subject", relation.subject.clone())
                .param("object", relation.object.clone())
                .param("confidence", relation.confidence as f64)
                .param("evidence", relation.evidence.clone());

            let rows = self.rows(query).await.context("Failed to index relation")?;
            if rows
                .first()
                .is_some_and(|row| row.get::<i64>("count").unwrap_or(0) > 0)
            {
                written += 1;
            }
        }
        Ok(written)
    }

    async fn document_graph(&self, document_id: &str) -> Result<Option<Subgraph>> {
        let exists = Query::new("MATCH (d:Document {id: $id}) RETURN count(d) AS count".to_string())
            .param("id", document_id.to_string());
        let found = self
            .rows(exists)
            .await?
            .first()
            .is_some_and(|row| row.get::<i64>("count").unwrap_or(0) > 0);
        if !found {
            return Ok(None);
        }

        // Step one: the document's own entities. Step two: relations whose
        // endpoints are both in that set.
        let members = self
            .entity_nodes(
                Query::new(format!(
                    "MATCH (d:Document {{id: $id}})-[:MENTIONS]->(e:Entity) RETURN {}",
                    ENTITY_COLUMNS
                ))
                .param("id", document_id.to_string()),
            )
            .await?;
        let texts: Vec<String> = members.iter().map(|n| n.text.clone()).collect();
        let edges = self.edges_among(&texts).await?;

        Ok(Some(induced_subgraph(members, edges)))
    }

    async fn entity_neighbors(
        &self,
        text: &str,
        max_depth: usize,
        limit: usize,
    ) -> Result<Option<Subgraph>> {
        let center = self
            .entity_nodes(
                Query::new(format!(
                    "MATCH (e:Entity {{text: $text}}) RETURN {}",
                    ENTITY_COLUMNS
                ))
                .param("text", text.to_string()),
            )
            .await?;
        let Some(center) = center.into_iter().next() else {
            return Ok(None);
        };

        let depth = max_depth.clamp(1, MAX_NEIGHBOR_DEPTH);
        let cypher = format!(
            r#"
            MATCH path = (c:Entity {{text: $text}})-[*1..{}]-(e:Entity)
            WHERE e <> c AND none(r IN relationships(path) WHERE type(r) = 'MENTIONS')
            WITH DISTINCT e
            RETURN {}
            LIMIT $limit
            "#,
            depth, ENTITY_COLUMNS
        );
        let neighbors = self
            .entity_nodes(
                Query::new(cypher)
                    .param("text", text.to_string())
                    .param("limit", limit as i64),
            )
            .await?;

        let mut members = vec![center];
        members.extend(neighbors);
        let texts: Vec<String> = members.iter().map(|n| n.text.clone()).collect();
        let edges = self.edges_among(&texts).await?;

        Ok(Some(induced_subgraph(members, edges)))
    }

    async fn search_by_label(&self, label: &str, limit: usize) -> Result<Vec<GraphNode>> {
        let query = Query::new(format!(
            "MATCH (e:Entity {{label: $label}}) RETURN {} ORDER BY e.confidence DESC, e.text LIMIT $limit",
            ENTITY_COLUMNS
        ))
        .param("label", label.to_string())
        .param("limit", limit as i64);
        self.entity_nodes(query).await
    }

    async fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            nodes: self.count("MATCH (n) RETURN count(n) AS count").await?,
            relationships: self.count("MATCH ()-[r]->() RETURN count(r) AS count").await?,
            documents: self.count("MATCH (d:Document) RETURN count(d) AS count").await?,
            entities: self.count("MATCH (e:Entity) RETURN count(e) AS count").await?,
        })
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mentioned = Query::new(
            r#"
            MATCH (d:Document {id: $id})
            OPTIONAL MATCH (d)-[:MENTIONS]->(e:Entity)
            RETURN d.id AS doc, e.text AS text
            "#
            .to_string(),
        )
        .param("id", document_id.to_string());
        let rows = self.rows(mentioned).await?;
        if rows.is_empty() {
            return Ok(false);
        }
        let texts: Vec<String> = rows
            .iter()
            .filter_map(|row| row.get::<String>("text").ok())
            .collect();

        self.graph
            .run(
                Query::new("MATCH (d:Document {id: $id}) DETACH DELETE d".to_string())
                    .param("id", document_id.to_string()),
            )
            .await
            .context("Failed to delete document node")?;

        // Entities no remaining document mentions go too, with their relations.
        self.graph
            .run(
                Query::new(
                    r#"
                    MATCH (e:Entity)
                    WHERE e.text IN $texts AND NOT ( (:Document)-[:MENTIONS]->(e) )
                    DETACH DELETE e
                    "#
                    .to_string(),
                )
                .param("texts", texts),
            )
            .await
            .context("Failed to delete orphaned entities")?;

        info!(document_id, "deleted document from graph");
        Ok(true)
    }

    fn backend(&self) -> &'static str {
        "neo4j"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_names_round_trip_edge_types() {
        assert_eq!(relation_name("BELONGS_TO"), "belongs_to");
        assert_eq!(relation_name("RELATED"), "related");
        assert_eq!(relation_name("CUSTOM_LINK"), "custom_link");
    }
}
