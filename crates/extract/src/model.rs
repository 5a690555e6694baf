use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::llm::OllamaClient;
use crate::prompt;
use crate::rules::{RuleBasedNer, resolve_overlaps};
use crate::schema::Entity;
use crate::span::CharIndex;

const MODEL_CONFIDENCE: f32 = 1.0;
const JSON_RETRIES: usize = 2;

#[derive(Debug, Deserialize)]
struct ModelOutput {
    #[serde(default)]
    entities: Vec<ModelEntity>,
}

#[derive(Debug, Deserialize)]
struct ModelEntity {
    text: String,
    #[serde(alias = "type")]
    label: String,
}

/// Recogniser backed by a language model. Any failure falls back to the
/// rule-based recogniser so callers always get an answer.
#[derive(Clone)]
pub struct ModelNer {
    client: OllamaClient,
    fallback: RuleBasedNer,
}

impl ModelNer {
    pub fn new(client: OllamaClient) -> Self {
        Self {
            client,
            fallback: RuleBasedNer::new(),
        }
    }

    pub async fn extract(&self, text: &str) -> Vec<Entity> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        match self.try_extract(text).await {
            Ok(entities) => {
                info!(model = self.client.model(), count = entities.len(), "model extraction");
                entities
            }
            Err(e) => {
                warn!(error = %e, "model extraction failed, using rules");
                self.fallback.extract(text)
            }
        }
    }

    async fn try_extract(&self, text: &str) -> Result<Vec<Entity>> {
        let value = self
            .client
            .generate_json_with_retry(&prompt::build_entity_prompt(text), JSON_RETRIES)
            .await?;
        locate_entities(text, value)
    }
}

/// Anchor model-reported entities to every literal occurrence in `text`.
/// Items that do not occur verbatim are dropped.
pub fn locate_entities(text: &str, value: serde_json::Value) -> Result<Vec<Entity>> {
    let output: ModelOutput =
        serde_json::from_value(value).context("Unexpected entity JSON shape")?;
    let index = CharIndex::new(text);

    let mut candidates = Vec::new();
    for item in output.entities {
        let needle = item.text.trim();
        if needle.is_empty() {
            continue;
        }
        let label = item.label.trim().to_uppercase();
        for (byte, matched) in text.match_indices(needle) {
            let (start, end) = index.char_range(byte, byte + matched.len());
            candidates.push(Entity::new(needle, label.as_str(), start, end, MODEL_CONFIDENCE));
        }
    }

    Ok(resolve_overlaps(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locate_entities_finds_every_occurrence() {
        let text = "张伟加入腾讯公司。腾讯公司位于深圳。";
        let value = json!({
            "entities": [
                {"text": "腾讯公司", "label": "org"},
                {"text": "张伟", "label": "PERSON"},
                {"text": "阿里巴巴", "label": "ORG"}
            ]
        });

        let entities = locate_entities(text, value).unwrap();
        let spans: Vec<_> = entities
            .iter()
            .map(|e| (e.text.as_str(), e.label.as_str(), e.start_char))
            .collect();
        assert_eq!(
            spans,
            vec![("张伟", "PERSON", 0), ("腾讯公司", "ORG", 4), ("腾讯公司", "ORG", 9)]
        );
        assert!(entities.iter().all(|e| e.confidence == 1.0));
    }

    #[test]
    fn test_locate_entities_rejects_wrong_shape() {
        assert!(locate_entities("x", json!({"entities": "none"})).is_err());
        assert!(locate_entities("x", json!({})).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_rules() {
        let ner = ModelNer::new(OllamaClient::new("http://127.0.0.1:9", "none"));
        let entities = ner.extract("深度学习需要大量数据").await;
        assert!(entities.iter().any(|e| e.text == "深度学习"));
    }
}
