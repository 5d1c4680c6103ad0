use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::llm_manager::ChatModel;

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic Claude messages API provider
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    max_tokens: usize,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        Ok(Self::with_config(
            api_key,
            model.unwrap_or_else(|| "claude-sonnet-4-0".to_string()),
            8192,
        )
        .with_temperature(temperature.unwrap_or(0.2)))
    }

    pub fn with_config(api_key: String, model: String, max_tokens: usize) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            client: Client::new(),
            max_tokens,
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn extract_text(&self, response: AnthropicResponse) -> Result<String> {
        match response.stop_reason.as_deref() {
            Some("max_tokens") => warn!(
                "Anthropic response was truncated due to max_tokens limit ({}). Response may be incomplete.",
                self.max_tokens
            ),
            Some("end_turn") | None => {}
            Some(other) => warn!("Anthropic response stopped with reason: {}", other),
        }

        let text: Vec<String> = response
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect();
        if text.is_empty() {
            return Err(anyhow!("No text content in Anthropic response"));
        }
        Ok(text.join(""))
    }
}

#[async_trait]
impl ChatModel for AnthropicProvider {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: &self.model,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Anthropic API error (status {}): {}", status, error_text));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;
        self.extract_text(api_response)
    }
}
