use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::llm::{ChatMessage, ChatProvider, LlmError, OllamaChat, OpenAiCompatible};
use extract::span::truncate_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenAi,
    Ollama,
}

/// A provider the registry knows how to build.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub models: &'static [&'static str],
    /// Environment variable holding the API key, if the provider takes one.
    pub env_key: Option<&'static str>,
    pub base_url: &'static str,
    pub protocol: Protocol,
}

impl ProviderSpec {
    pub fn default_model(&self) -> &'static str {
        self.models.first().copied().unwrap_or_default()
    }

    pub fn supports(&self, model: &str) -> bool {
        self.models.iter().any(|m| *m == model)
    }
}

pub const CATALOGUE: &[ProviderSpec] = &[
    ProviderSpec {
        id: "openai",
        name: "OpenAI (ChatGPT)",
        models: &["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo"],
        env_key: Some("OPENAI_API_KEY"),
        base_url: "https://api.openai.com/v1",
        protocol: Protocol::OpenAi,
    },
    ProviderSpec {
        id: "qwen",
        name: "千问 (通义千问)",
        models: &["qwen-turbo", "qwen-plus", "qwen-max"],
        env_key: Some("QWEN_API_KEY"),
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        protocol: Protocol::OpenAi,
    },
    ProviderSpec {
        id: "deepseek",
        name: "DeepSeek",
        models: &["deepseek-chat", "deepseek-coder"],
        env_key: Some("DEEPSEEK_API_KEY"),
        base_url: "https://api.deepseek.com/v1",
        protocol: Protocol::OpenAi,
    },
    ProviderSpec {
        id: "ollama",
        name: "Ollama (本地模型)",
        models: &["qwen2.5:7b", "llama3", "mistral"],
        env_key: None,
        base_url: "http://localhost:11434",
        protocol: Protocol::Ollama,
    },
];

pub fn find_spec(id: &str) -> Option<&'static ProviderSpec> {
    CATALOGUE.iter().find(|spec| spec.id == id)
}

/// Builds a client for `(spec, api_key, model)`.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderSpec, &str, &str) -> Arc<dyn ChatProvider> + Send + Sync>;

fn http_factory() -> ProviderFactory {
    Arc::new(|spec: &ProviderSpec, api_key: &str, model: &str| -> Arc<dyn ChatProvider> {
        match spec.protocol {
            Protocol::OpenAi => Arc::new(OpenAiCompatible::new(
                spec.id,
                spec.base_url,
                api_key,
                model,
            )),
            Protocol::Ollama => Arc::new(OllamaChat::new(spec.base_url, model)),
        }
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub models: Vec<String>,
    pub current: bool,
    pub configured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentProvider {
    pub provider: String,
    pub model: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl TestOutcome {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            model: None,
            response: None,
        }
    }
}

struct Configured {
    api_key: String,
    client: Arc<dyn ChatProvider>,
}

#[derive(Default)]
struct RegistryState {
    providers: HashMap<&'static str, Configured>,
    current: Option<&'static str>,
}

/// Configured chat providers and the active selection.
///
/// Requests take a [`snapshot`](Self::snapshot) once and use it until they
/// finish, so a concurrent `switch` never changes provider mid-request.
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
    factory: ProviderFactory,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::with_factory(http_factory())
    }

    pub fn with_factory(factory: ProviderFactory) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            factory,
        }
    }

    /// Add or replace a provider. The first configured provider becomes
    /// the active one.
    pub async fn configure(
        &self,
        provider_id: &str,
        api_key: &str,
        model: Option<&str>,
    ) -> Result<(), LlmError> {
        let spec = find_spec(provider_id)
            .ok_or_else(|| LlmError::UnknownProvider(provider_id.to_string()))?;
        let model = match model {
            Some(m) if spec.supports(m) => m,
            Some(m) => {
                return Err(LlmError::UnsupportedModel {
                    provider: spec.id.to_string(),
                    model: m.to_string(),
                });
            }
            None => spec.default_model(),
        };

        let client = (self.factory)(spec, api_key, model);
        let mut state = self.state.write().await;
        state.providers.insert(
            spec.id,
            Configured {
                api_key: api_key.to_string(),
                client,
            },
        );
        if state.current.is_none() {
            state.current = Some(spec.id);
        }

        info!(provider = spec.id, model, "LLM provider configured");
        Ok(())
    }

    /// Make a configured provider active. An unsupported `model` keeps the
    /// provider's current model.
    pub async fn switch(
        &self,
        provider_id: &str,
        model: Option<&str>,
    ) -> Result<CurrentProvider, LlmError> {
        let spec = find_spec(provider_id)
            .ok_or_else(|| LlmError::UnknownProvider(provider_id.to_string()))?;

        let mut state = self.state.write().await;
        let Some(entry) = state.providers.get_mut(spec.id) else {
            return Err(LlmError::NotConfigured {
                provider: spec.id.to_string(),
            });
        };

        match model {
            Some(m) if spec.supports(m) => {
                if entry.client.model() != m {
                    entry.client = (self.factory)(spec, &entry.api_key, m);
                }
            }
            Some(m) => {
                warn!(
                    provider = spec.id,
                    model = m,
                    current = entry.client.model(),
                    "Model not in supported list, keeping current model"
                );
            }
            None => {}
        }

        let current = CurrentProvider {
            provider: spec.id.to_string(),
            model: entry.client.model().to_string(),
            name: spec.name.to_string(),
        };
        state.current = Some(spec.id);

        info!(provider = %current.provider, model = %current.model, "Switched LLM provider");
        Ok(current)
    }

    /// Check credentials with a one-word completion. Never touches the
    /// registry state.
    pub async fn test(&self, provider_id: &str, api_key: &str, model: Option<&str>) -> TestOutcome {
        let Some(spec) = find_spec(provider_id) else {
            return TestOutcome::failed(format!("未知的提供商: {provider_id}"));
        };
        let model = model.unwrap_or_else(|| spec.default_model());
        let client = (self.factory)(spec, api_key, model);

        match client
            .chat_completion(&[ChatMessage::user("Hello")], 0.3, 10)
            .await
        {
            Ok(completion) => {
                info!(provider = spec.id, "API key test successful");
                TestOutcome {
                    success: true,
                    message: format!("{} 连接成功", spec.name),
                    model: Some(model.to_string()),
                    response: Some(truncate_chars(&completion.content, 50)),
                }
            }
            Err(e) => {
                error!(provider = spec.id, error = %e, "API key test failed");
                TestOutcome::failed(format!("连接失败: {e}"))
            }
        }
    }

    /// Configured providers only.
    pub async fn available(&self) -> Vec<ProviderInfo> {
        self.list(true).await
    }

    /// The whole catalogue, with configuration flags.
    pub async fn all(&self) -> Vec<ProviderInfo> {
        self.list(false).await
    }

    async fn list(&self, configured_only: bool) -> Vec<ProviderInfo> {
        let state = self.state.read().await;
        CATALOGUE
            .iter()
            .filter(|spec| !configured_only || state.providers.contains_key(spec.id))
            .map(|spec| ProviderInfo {
                id: spec.id.to_string(),
                name: spec.name.to_string(),
                models: spec.models.iter().map(|m| m.to_string()).collect(),
                current: state.current == Some(spec.id),
                configured: state.providers.contains_key(spec.id),
            })
            .collect()
    }

    pub async fn current(&self) -> CurrentProvider {
        let state = self.state.read().await;
        let active = state
            .current
            .and_then(|id| Some((find_spec(id)?, state.providers.get(id)?)));
        match active {
            Some((spec, entry)) => CurrentProvider {
                provider: spec.id.to_string(),
                model: entry.client.model().to_string(),
                name: spec.name.to_string(),
            },
            None => CurrentProvider {
                provider: "none".to_string(),
                model: "none".to_string(),
                name: "未配置".to_string(),
            },
        }
    }

    pub async fn is_available(&self) -> bool {
        !self.state.read().await.providers.is_empty()
    }

    /// The active client, fixed for the caller's lifetime.
    pub async fn snapshot(&self) -> Option<Arc<dyn ChatProvider>> {
        let state = self.state.read().await;
        let id = state.current?;
        state.providers.get(id).map(|entry| entry.client.clone())
    }
}
