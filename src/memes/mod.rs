//! Campaign meme generation
//!
//! Pulls real comments for the target and competitor movies, asks the LLM for
//! text that fits each registered template, and burns the text onto the
//! template image.

pub mod pipeline;
pub mod prompts;
pub mod render;

pub use pipeline::{MemeBatch, MemeContext, MemePipeline};
pub use render::{list_generated, GeneratedFile, MemeRenderer, RenderError};

use crate::llm::LlmError;
use crate::types::{MemeCategory, Tone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TARGET: &str = "One Battle After Another";
pub const DEFAULT_COMPETITOR: &str = "Sinners";
pub const MAX_MEMES: usize = 12;

#[derive(Debug, Error)]
pub enum MemeError {
    #[error("num_memes must be between 1 and {MAX_MEMES}, got {0}")]
    InvalidCount(usize),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("No templates available for generation")]
    NoTemplates,

    #[error("{template}: LLM call failed: {source}")]
    Llm {
        template: String,
        #[source]
        source: LlmError,
    },

    #[error("{template}: response has no text for slot '{slot}'")]
    MissingSlot { template: String, slot: String },
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

fn default_competitor() -> String {
    DEFAULT_COMPETITOR.to_string()
}

fn default_num_memes() -> usize {
    5
}

/// What to generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub category: MemeCategory,
    #[serde(default = "default_target")]
    pub target_movie: String,
    #[serde(default = "default_competitor")]
    pub competitor_movie: String,
    /// Template ids; all usable templates when absent
    #[serde(default)]
    pub templates: Option<Vec<String>>,
    #[serde(default = "default_num_memes")]
    pub num_memes: usize,
    #[serde(default)]
    pub custom_themes: Vec<String>,
    #[serde(default)]
    pub tone: Tone,
}

impl GenerationRequest {
    pub fn new(category: MemeCategory) -> Self {
        Self {
            category,
            target_movie: default_target(),
            competitor_movie: default_competitor(),
            templates: None,
            num_memes: default_num_memes(),
            custom_themes: Vec::new(),
            tone: Tone::default(),
        }
    }

    pub fn validate(&self) -> Result<(), MemeError> {
        if !(1..=MAX_MEMES).contains(&self.num_memes) {
            return Err(MemeError::InvalidCount(self.num_memes));
        }
        Ok(())
    }

    /// Campaign goal line given to the LLM
    pub fn goal(&self) -> String {
        match self.category {
            MemeCategory::ProObaa => format!(
                "Boost {} - celebrate its qualities, make it look superior",
                self.target_movie
            ),
            MemeCategory::AntiSinners => format!(
                "Undermine {} - mock the hype, question the quality",
                self.competitor_movie
            ),
        }
    }
}
