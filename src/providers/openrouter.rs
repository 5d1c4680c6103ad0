use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::env;

use crate::llm_manager::ChatModel;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenRouterProvider {
    pub model: String,
    pub temperature: f32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY environment variable not set")?;
        Ok(Self {
            model: model.unwrap_or_else(|| "deepseek/deepseek-r1-0528-qwen3-8b".to_string()),
            temperature: temperature.unwrap_or(0.2),
            api_key,
            client: reqwest::Client::new(),
        })
    }
}

fn first_message_content(json: &serde_json::Value) -> Result<String> {
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No content in OpenRouter response"))
}

#[async_trait]
impl ChatModel for OpenRouterProvider {
    fn name(&self) -> &str { "openrouter" }
    fn model_name(&self) -> &str { &self.model }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let req_body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
        });
        let resp = self.client
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .header("X-Title", "task_processor")
            .json(&req_body)
            .send()
            .await
            .context("Failed to send request to OpenRouter")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("OpenRouter API error (status {}): {}", status, body));
        }
        let json: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse OpenRouter response")?;
        first_message_content(&json)
    }
}
