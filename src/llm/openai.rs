//! OpenAI-compatible chat completions backend

use super::{LlmClient, LlmError, LlmRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: String, model: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn body(&self, request: &LlmRequest) -> Value {
        let user_content = match &request.image {
            Some(image) => json!([
                {"type": "text", "text": request.user},
                {"type": "image_url", "image_url": {"url": image.data_url}},
            ]),
            None => json!(request.user),
        };

        json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": user_content},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": request.schema_name, "schema": request.schema},
            },
        })
    }
}

/// Pull the JSON object out of a chat completion payload
fn parse_completion(response: ChatResponse) -> Result<Value, LlmError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| LlmError::InvalidOutput("no choices in response".to_string()))?;

    if let Some(refusal) = message.refusal {
        return Err(LlmError::InvalidOutput(format!("model refused: {}", refusal)));
    }

    let content = message
        .content
        .ok_or_else(|| LlmError::InvalidOutput("empty message content".to_string()))?;

    let value: Value = serde_json::from_str(&content)
        .map_err(|e| LlmError::InvalidOutput(format!("content is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(LlmError::InvalidOutput("content is not a JSON object".to_string()));
    }
    Ok(value)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete_json(&self, request: LlmRequest) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("[LLM] {} -> {}", request.schema_name, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidOutput(e.to_string()))?;
        parse_completion(parsed)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
