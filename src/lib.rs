//! Oscars Campaign Toolkit
//!
//! Tooling for an awards-season social campaign:
//!
//! 1. **Sentiment**: score scraped YouTube/Reddit comments and roll them up
//!    per movie and per source, plus keyword-weighted campaign priorities.
//!
//! 2. **Markets**: pull Oscar prediction markets from Kalshi, match them to
//!    the watchlist and reshape them into comparison JSON.
//!
//! 3. **Memes**: onboard new templates through a seven-stage LLM pipeline,
//!    then write and render campaign memes from real comments.

pub mod api;
pub mod campaign;
pub mod comments;
pub mod config;
pub mod dashboard;
pub mod llm;
pub mod markets;
pub mod memes;
pub mod sentiment;
pub mod templates;
pub mod types;

pub use comments::CommentDatabase;
pub use config::Config;
pub use llm::{LlmClient, MockLlmClient, OpenAiClient};
pub use markets::{KalshiClient, MarketCache};
pub use memes::{MemePipeline, MemeRenderer};
pub use sentiment::{PolarityScorer, VaderScorer};
pub use templates::{TemplateIntegrator, TemplatePipeline, TemplateRegistry};
pub use types::{GeneratedMeme, MemeCategory, Sentiment, TemplateEntry, Tone};
