use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm_manager::ChatModel;

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    /// Constrains output to valid JSON
    format: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

/// Ollama local LLM provider using the native chat endpoint
pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: Client,
    max_tokens: Option<usize>,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(
        model: Option<String>,
        temperature: Option<f32>,
        base_url: Option<String>,
        max_tokens: Option<usize>,
    ) -> Self {
        Self {
            model: model.unwrap_or_else(|| "qwen3:8b".to_string()),
            base_url: base_url
                .unwrap_or_else(|| "http://localhost:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            client: Client::new(),
            max_tokens,
            temperature: temperature.unwrap_or(0.7),
        }
    }

    fn build_request<'a>(&'a self, prompt: &str) -> OllamaRequest<'a> {
        OllamaRequest {
            model: &self.model,
            messages: vec![OllamaMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            format: "json",
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }

    fn parse_response(&self, status: reqwest::StatusCode, body: &str) -> Result<String> {
        if !status.is_success() {
            return match serde_json::from_str::<OllamaError>(body) {
                Ok(err) => Err(anyhow!("Ollama API error (status {}): {}", status, err.error)),
                Err(_) => Err(anyhow!("Ollama API error (status {}): {}", status, body)),
            };
        }

        let response: OllamaResponse =
            serde_json::from_str(body).context("Failed to parse Ollama API response")?;
        match response.done_reason.as_deref() {
            Some("length") => warn!(
                "Ollama response was truncated due to the token limit ({:?}). Response may be incomplete.",
                self.max_tokens
            ),
            Some("stop") | None => {}
            Some(other) => warn!("Ollama response finished with reason: {}", other),
        }
        Ok(response.message.content)
    }
}

#[async_trait]
impl ChatModel for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.build_request(prompt))
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        let status = response.status();
        let body = response.text().await?;
        self.parse_response(status, &body)
    }
}
