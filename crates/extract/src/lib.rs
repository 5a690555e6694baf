pub mod lexicon;
pub mod llm;
pub mod model;
pub mod prompt;
pub mod relations;
pub mod rules;
pub mod schema;
pub mod span;

pub use llm::OllamaClient;
pub use model::ModelNer;
pub use relations::{RelationConfig, RelationExtractor};
pub use rules::{RuleBasedNer, resolve_overlaps};
pub use schema::{Entity, Predicate, Relation, label};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    #[default]
    Rules,
    Model,
}

/// Entity recogniser selected at construction. Both strategies return
/// non-overlapping spans sorted by start offset.
#[derive(Clone)]
pub enum EntityExtractor {
    Rules(RuleBasedNer),
    Model(ModelNer),
}

impl EntityExtractor {
    pub fn rules() -> Self {
        Self::Rules(RuleBasedNer::new())
    }

    pub fn model(base_url: &str, model: &str) -> Self {
        Self::Model(ModelNer::new(OllamaClient::new(base_url, model)))
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            Self::Rules(_) => ExtractionStrategy::Rules,
            Self::Model(_) => ExtractionStrategy::Model,
        }
    }

    pub async fn extract(&self, text: &str) -> Vec<Entity> {
        match self {
            Self::Rules(ner) => ner.extract(text),
            Self::Model(ner) => ner.extract(text).await,
        }
    }
}

/// Entities and relations found in one text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

/// Entities first, then relations on the blocking pool.
pub async fn extract_all(
    entity_extractor: &EntityExtractor,
    relation_extractor: &RelationExtractor,
    text: &str,
) -> Result<ExtractionResult> {
    let entities = entity_extractor.extract(text).await;
    let relation_extractor = relation_extractor.clone();
    let text = text.to_string();

    tokio::task::spawn_blocking(move || {
        let relations = relation_extractor.extract(&text, &entities);
        ExtractionResult {
            entities,
            relations,
        }
    })
    .await
    .context("Relation extraction task failed")
}
