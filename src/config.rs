//! Configuration management for the campaign toolkit

use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Which LLM backend the pipelines talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions endpoint
    OpenAi,
    /// Canned responses, no network
    Mock,
}

impl LlmProvider {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "mock" => Some(LlmProvider::Mock),
            _ => None,
        }
    }
}

/// Toolkit configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI provider
    pub openai_api_key: Option<String>,

    /// Selected LLM backend
    pub llm_provider: LlmProvider,

    /// Base URL for chat completions (OpenAI or compatible)
    pub openai_base_url: String,

    /// Model used for meme text generation
    pub llm_model: String,

    /// Model used by the template analysis agents (needs vision)
    pub vision_model: String,

    /// Deadline for a single template pipeline stage
    pub stage_timeout: Duration,

    /// Kalshi trade API base URL
    pub kalshi_base_url: String,

    /// Market cache time-to-live in minutes
    pub cache_ttl_minutes: i64,

    /// Directory for the market file cache (None disables the file layer)
    pub cache_dir: Option<PathBuf>,

    /// Directory holding sentiment CSVs and raw comment JSON
    pub data_dir: PathBuf,

    /// Directory holding template images
    pub template_dir: PathBuf,

    /// Directory for uploaded template candidates
    pub upload_dir: PathBuf,

    /// Directory holding the JSON template registry
    pub registry_dir: PathBuf,

    /// Where registry backups are written before modification
    pub backup_dir: PathBuf,

    /// Where rendered memes are written
    pub output_dir: PathBuf,

    /// TTF/OTF font used when burning text onto templates
    pub font_path: Option<PathBuf>,

    /// HTTP bind host
    pub server_host: String,

    /// HTTP bind port
    pub server_port: u16,
}

fn path_var(name: &str, default: &str) -> PathBuf {
    env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let openai_api_key = env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty());

        let llm_provider = match env::var("LLM_PROVIDER").ok().filter(|s| !s.is_empty()) {
            Some(v) => LlmProvider::parse(&v)
                .ok_or_else(|| anyhow::anyhow!("LLM_PROVIDER must be 'openai' or 'mock', got '{}'", v))?,
            // Without a key the only thing that can work is the mock
            None if openai_api_key.is_some() => LlmProvider::OpenAi,
            None => LlmProvider::Mock,
        };

        let openai_base_url = env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let llm_model = env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let vision_model = env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let stage_timeout_secs = env::var("STAGE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120u64);

        let kalshi_base_url = env::var("KALSHI_BASE_URL")
            .unwrap_or_else(|_| KalshiApi::BASE_URL.to_string());

        let cache_ttl_minutes = env::var("CACHE_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let cache_dir = match env::var("CACHE_DIR") {
            Ok(v) if v.eq_ignore_ascii_case("none") => None,
            Ok(v) if !v.is_empty() => Some(PathBuf::from(v)),
            _ => Some(PathBuf::from("cache")),
        };

        let registry_dir = path_var("REGISTRY_DIR", "registry");
        let backup_dir = env::var("BACKUP_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| registry_dir.join("backups"));

        let font_path = env::var("MEME_FONT_PATH").ok().filter(|s| !s.is_empty()).map(PathBuf::from);

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        // Validate configuration
        if llm_provider == LlmProvider::OpenAi && openai_api_key.is_none() {
            anyhow::bail!("OPENAI_API_KEY required when LLM_PROVIDER=openai");
        }
        if cache_ttl_minutes <= 0 {
            anyhow::bail!("CACHE_TTL_MINUTES must be positive");
        }
        if stage_timeout_secs == 0 {
            anyhow::bail!("STAGE_TIMEOUT_SECS must be positive");
        }

        Ok(Self {
            openai_api_key,
            llm_provider,
            openai_base_url,
            llm_model,
            vision_model,
            stage_timeout: Duration::from_secs(stage_timeout_secs),
            kalshi_base_url,
            cache_ttl_minutes,
            cache_dir,
            data_dir: path_var("DATA_DIR", "data"),
            template_dir: path_var("TEMPLATE_DIR", "templates"),
            upload_dir: path_var("UPLOAD_DIR", "uploads"),
            registry_dir,
            backup_dir,
            output_dir: path_var("OUTPUT_DIR", "generated"),
            font_path,
            server_host,
            server_port,
        })
    }

    /// Configuration rooted at a single directory, mock LLM, no network keys.
    /// Used by tests and by the CLI's offline mode.
    pub fn local(root: &std::path::Path) -> Self {
        Self {
            openai_api_key: None,
            llm_provider: LlmProvider::Mock,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            stage_timeout: Duration::from_secs(120),
            kalshi_base_url: KalshiApi::BASE_URL.to_string(),
            cache_ttl_minutes: 5,
            cache_dir: Some(root.join("cache")),
            data_dir: root.join("data"),
            template_dir: root.join("templates"),
            upload_dir: root.join("uploads"),
            registry_dir: root.join("registry"),
            backup_dir: root.join("registry").join("backups"),
            output_dir: root.join("generated"),
            font_path: None,
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
        }
    }

    /// Socket address string for the HTTP server
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Kalshi trade API configuration
pub struct KalshiApi;

impl KalshiApi {
    pub const BASE_URL: &'static str = "https://api.elections.kalshi.com/trade-api/v2";

    pub fn series_url(base: &str) -> String {
        format!("{}/series", base.trim_end_matches('/'))
    }

    pub fn markets_url(base: &str) -> String {
        format!("{}/markets", base.trim_end_matches('/'))
    }
}
