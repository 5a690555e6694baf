use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use extract::{Entity, Relation};
use index::IndexOutcome;
use ingest::DocumentMetadata;

/// Everything kept about one ingested document.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub text: String,
    pub chunks_count: usize,
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
    pub metadata: DocumentMetadata,
    pub processing: IndexOutcome,
    pub created_at: DateTime<Utc>,
}

/// Row in the document list.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub text_length: usize,
    pub entities_count: usize,
    pub chunks_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    pub document_id: String,
    pub file_name: String,
    pub file_type: String,
    pub text_length: usize,
    pub chunks_count: usize,
    pub entities_count: usize,
    pub relations_count: usize,
    pub metadata: DocumentMetadata,
    pub processing: IndexOutcome,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn text_length(&self) -> usize {
        self.text.chars().count()
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            document_id: self.document_id.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            text_length: self.text_length(),
            entities_count: self.entities.len(),
            chunks_count: self.chunks_count,
            created_at: self.created_at,
        }
    }

    pub fn detail(&self) -> DocumentDetail {
        DocumentDetail {
            document_id: self.document_id.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            text_length: self.text_length(),
            chunks_count: self.chunks_count,
            entities_count: self.entities.len(),
            relations_count: self.relations.len(),
            metadata: self.metadata.clone(),
            processing: self.processing.clone(),
            created_at: self.created_at,
        }
    }
}

/// In-memory document registry shared by all handlers.
#[derive(Clone, Default)]
pub struct DocumentRegistry {
    documents: Arc<DashMap<String, Arc<DocumentRecord>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: DocumentRecord) -> Arc<DocumentRecord> {
        let record = Arc::new(record);
        self.documents
            .insert(record.document_id.clone(), record.clone());
        record
    }

    pub fn get(&self, document_id: &str) -> Option<Arc<DocumentRecord>> {
        self.documents.get(document_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.documents.contains_key(document_id)
    }

    pub fn remove(&self, document_id: &str) -> Option<Arc<DocumentRecord>> {
        self.documents.remove(document_id).map(|(_, record)| record)
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<DocumentSummary> {
        let mut rows: Vec<DocumentSummary> =
            self.documents.iter().map(|r| r.value().summary()).collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        rows
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use index::StageOutcome;

    pub(crate) fn record(id: &str, text: &str) -> DocumentRecord {
        DocumentRecord {
            document_id: id.to_string(),
            file_name: format!("{id}.txt"),
            file_type: "txt".to_string(),
            file_path: format!("/tmp/{id}.txt"),
            text: text.to_string(),
            chunks_count: 1,
            entities: vec![Entity::new("Python", "TECH", 0, 6, 0.9)],
            relations: Vec::new(),
            metadata: DocumentMetadata::default(),
            processing: IndexOutcome {
                vector: StageOutcome::Skipped,
                graph: StageOutcome::Skipped,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_registry_roundtrip() {
        let registry = DocumentRegistry::new();
        registry.insert(record("a", "Python 很流行"));
        registry.insert(record("b", "知识图谱"));

        assert_eq!(registry.len(), 2);
        let detail = registry.get("a").unwrap().detail();
        assert_eq!(detail.text_length, 10);
        assert_eq!(detail.entities_count, 1);
        assert_eq!(registry.list().len(), 2);

        assert!(registry.remove("a").is_some());
        assert!(!registry.contains("a"));
        assert!(registry.remove("a").is_none());
    }
}
