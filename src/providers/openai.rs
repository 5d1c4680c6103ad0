use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, warn};

use crate::llm_manager::ChatModel;

/// OpenAI chat completions provider
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider reading `OPENAI_API_KEY`
    pub fn new(model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let api_key =
            env::var("OPENAI_API_KEY").context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self::with_config(api_key, model.unwrap_or_else(|| "gpt-4.1".to_string()))
            .with_temperature(temperature.unwrap_or(0.2)))
    }

    pub fn with_config(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.2,
            client: Client::new(),
        }
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    // Reasoning models reject a temperature parameter.
    fn is_reasoning_model(model: &str) -> bool {
        model.starts_with("o1") || model.starts_with("o3") || model.starts_with("o4")
    }

    fn build_request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: (!Self::is_reasoning_model(&self.model)).then_some(self.temperature),
        }
    }

    fn extract_content(response: ChatResponse) -> Result<String> {
        if let Some(usage) = &response.usage {
            debug!(
                "OpenAI usage: {} prompt tokens, {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in OpenAI response"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!("OpenAI response was truncated by the token limit. Response may be incomplete.");
        }
        if let Some(refusal) = choice.message.refusal {
            return Err(anyhow!("OpenAI model refused the request: {}", refusal));
        }
        choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| anyhow!("No text content in OpenAI response"))
    }
}

#[async_trait]
impl ChatModel for OpenAIProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.build_request(prompt))
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(anyhow!("OpenAI API error (status {}): {}", status, response_text));
        }
        debug!("Raw OpenAI response: {}", response_text);

        let parsed: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse OpenAI API response")?;
        Self::extract_content(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_models_omit_temperature() {
        let provider = OpenAIProvider::with_config("key".to_string(), "o4-mini".to_string());
        let body = serde_json::to_value(provider.build_request("hi")).unwrap();
        assert!(body.get("temperature").is_none());

        let provider = OpenAIProvider::with_config("key".to_string(), "gpt-4.1".to_string())
            .with_temperature(0.5);
        let body = serde_json::to_value(provider.build_request("hi")).unwrap();
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_extract_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{\"title\": \"x\"}"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}}"#,
        )
        .unwrap();
        assert_eq!(OpenAIProvider::extract_content(response).unwrap(), "{\"title\": \"x\"}");
    }

    #[test]
    fn test_refusal_is_an_error() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": null, "refusal": "no"}, "finish_reason": "stop"}]}"#,
        )
        .unwrap();
        assert!(OpenAIProvider::extract_content(response).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let provider = OpenAIProvider::with_config("key".to_string(), "gpt-4.1".to_string())
            .with_base_url("http://localhost:8080/v1/".to_string());
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }
}
