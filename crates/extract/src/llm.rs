use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::prompt;

/// Minimal Ollama `/api/generate` client used in JSON mode.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    /// Generate, asking the model to repair its own output when it is not
    /// valid JSON.
    pub async fn generate_json_with_retry(
        &self,
        prompt: &str,
        max_retries: usize,
    ) -> Result<serde_json::Value> {
        for attempt in 0..max_retries {
            let response = self.generate(prompt).await?;
            if let Ok(value) = serde_json::from_str(&response) {
                return Ok(value);
            }
            debug!(attempt, "model returned invalid JSON");

            if attempt + 1 < max_retries {
                let corrected = self.generate(&prompt::build_retry_prompt(&response)).await?;
                if let Ok(value) = serde_json::from_str(&corrected) {
                    return Ok(value);
                }
            }
        }

        warn!(model = %self.model, max_retries, "no valid JSON from model");
        anyhow::bail!("Failed to get valid JSON after {} retries", max_retries)
    }
}
