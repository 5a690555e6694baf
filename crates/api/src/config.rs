use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::env;

use extract::{ExtractionStrategy, RelationConfig};
use ingest::SegmenterConfig;
use query::RetryConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub segmenter: SegmenterConfig,
    pub extraction: ExtractionConfig,
    pub vector: VectorConfig,
    pub graph: GraphConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: "./uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub strategy: ExtractionStrategy,
    pub model_url: String,
    pub model_name: String,
    pub max_pattern_entities: usize,
    pub cooccurrence_window: usize,
    pub cooccurrence_max_distance: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        let relations = RelationConfig::default();
        Self {
            strategy: ExtractionStrategy::Rules,
            model_url: "http://localhost:11434".to_string(),
            model_name: "qwen2.5:7b".to_string(),
            max_pattern_entities: relations.max_pattern_entities,
            cooccurrence_window: relations.pair_window,
            cooccurrence_max_distance: relations.max_distance,
        }
    }
}

impl ExtractionConfig {
    pub fn relation_config(&self) -> RelationConfig {
        RelationConfig {
            max_pattern_entities: self.max_pattern_entities,
            pair_window: self.cooccurrence_window,
            max_distance: self.cooccurrence_max_distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Ollama,
    /// Deterministic hashing encoder, no model server needed.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub url: String,
    pub collection: String,
    pub embedder: EmbedderKind,
    pub embedding_url: String,
    pub embedding_model: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            collection: "documents".to_string(),
            embedder: EmbedderKind::Ollama,
            embedding_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    Neo4j,
    Memory,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Neo4j,
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "password".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub hybrid_top_k: usize,
    pub semantic_weight: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            hybrid_top_k: 10,
            semantic_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub providers: Vec<ProviderConfig>,
    pub default_provider: Option<String>,
}

impl AppConfig {
    /// Defaults, then `config.toml`, then `config.<RUST_ENV>.toml`, then
    /// `APP_` variables (`APP_GRAPH__URI=...`).
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::figment(&env_name)
            .extract()
            .context("Failed to load configuration")
    }

    fn figment(env_name: &str) -> Figment {
        let profile_file = match env_name {
            "dev" | "development" => Some("config.dev.toml"),
            "prod" | "production" => Some("config.prod.toml"),
            "test" | "testing" => Some("config.test.toml"),
            _ => None,
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config.toml"));
        if let Some(file) = profile_file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }
}
