use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Minimal client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct LocalLlm {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LocalLlm {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Generate a completion. Errors come back as `[LocalLLM error] ...` text
    /// so a dead model server never fails a scan.
    pub async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(text) => text,
            Err(e) => format!("[LocalLLM error] {e}"),
        }
    }

    async fn try_generate(&self, prompt: &str) -> reqwest::Result<String> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };
        debug!(model = %self.config.model, url = %self.config.url, "llm request");
        let resp: GenerateResponse = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.response)
    }
}
