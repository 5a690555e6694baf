use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable node id for an entity text. The same text always maps to the
/// same node, whichever document mentions it.
pub fn entity_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..16])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    pub file_name: String,
    pub title: String,
    pub author: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub text: String,
    pub label: String,
    pub confidence: f32,
}

impl GraphNode {
    pub fn from_entity(entity: &extract::Entity) -> Self {
        Self {
            id: entity_id(&entity.text),
            text: entity.text.clone(),
            label: entity.label.clone(),
            confidence: entity.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub relationships: usize,
    pub documents: usize,
    pub entities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_depends_only_on_text() {
        let a = entity_id("知识图谱");
        assert_eq!(a.len(), 32);
        assert_eq!(a, entity_id("知识图谱"));
        assert_ne!(a, entity_id("知识图"));
    }
}
