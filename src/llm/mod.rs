//! Structured-output LLM access
//!
//! Every call asks for one JSON object matching a JSON Schema. The pipelines
//! only see the [`LlmClient`] trait; the concrete backend is picked from
//! `LLM_PROVIDER` at startup.

pub mod mock;
pub mod openai;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;

use crate::config::{Config, LlmProvider};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM returned unusable output: {0}")]
    InvalidOutput(String),
}

/// An image attached to a request, already encoded as a data URL
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub data_url: String,
}

impl ImageInput {
    /// Encode raw bytes; the media type follows the file extension
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Self {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            data_url: format!("data:{};base64,{}", media_type(path), encoded),
        }
    }
}

/// Media type for an image path, PNG when unknown
pub fn media_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// One structured-output call
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub image: Option<ImageInput>,
    /// Name the backend reports the schema under
    pub schema_name: String,
    pub schema: Value,
    /// Overrides the client's default model
    pub model: Option<String>,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, schema_name: impl Into<String>, schema: Value) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            image: None,
            schema_name: schema_name.into(),
            schema,
            model: None,
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run the request and return the parsed JSON object
    async fn complete_json(&self, request: LlmRequest) -> Result<Value, LlmError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Build the backend selected by configuration
pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn LlmClient>> {
    match config.llm_provider {
        LlmProvider::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is required for the openai provider"))?;
            Ok(Arc::new(OpenAiClient::new(&config.openai_base_url, key, &config.llm_model)?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_from_extension() {
        assert_eq!(media_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(media_type(Path::new("a.webp")), "image/webp");
        assert_eq!(media_type(Path::new("a")), "image/png");
    }

    #[test]
    fn test_image_data_url() {
        let image = ImageInput::from_bytes(b"abc", Path::new("drake.jpeg"));
        assert_eq!(image.data_url, "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_from_config_mock() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::local(dir.path());
        let client = from_config(&config).unwrap();
        assert_eq!(client.name(), "mock");
    }
}
