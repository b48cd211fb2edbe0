//! Core types shared across the campaign toolkit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Polarity classification of a single comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Classify a compound score with the fixed ±0.05 thresholds
    pub fn from_compound(compound: f64) -> Self {
        if compound >= 0.05 {
            Sentiment::Positive
        } else if compound <= -0.05 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign direction for generated memes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemeCategory {
    /// Boost One Battle After Another
    ProObaa,
    /// Undermine Sinners
    AntiSinners,
}

impl MemeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemeCategory::ProObaa => "pro_obaa",
            MemeCategory::AntiSinners => "anti_sinners",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pro_obaa" => Some(MemeCategory::ProObaa),
            "anti_sinners" => Some(MemeCategory::AntiSinners),
            _ => None,
        }
    }

    pub fn all() -> [MemeCategory; 2] {
        [MemeCategory::ProObaa, MemeCategory::AntiSinners]
    }
}

impl fmt::Display for MemeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice of generated meme text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Savage,
    Playful,
    Sarcastic,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Savage => "savage",
            Tone::Playful => "playful",
            Tone::Sarcastic => "sarcastic",
        }
    }
}

/// Horizontal text alignment inside a slot box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    #[default]
    Center,
    Right,
}

/// Pixel box a slot's text is drawn into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPosition {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub alignment: Alignment,
}

/// A template in the permanent registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub id: String,
    pub name: String,
    /// Image file name inside the template directory
    pub filename: String,
    pub text_slots: usize,
    pub slot_names: Vec<String>,
    pub irony_type: String,
    pub description: String,
    pub tone: String,
    pub max_chars_per_slot: usize,
    /// Example text per slot name
    #[serde(default)]
    pub example: BTreeMap<String, String>,
    pub generator_function: String,
}

impl TemplateEntry {
    /// Whether the declared slot count agrees with the slot names
    pub fn is_consistent(&self) -> bool {
        self.text_slots == self.slot_names.len() && self.text_slots > 0
    }
}

/// A meme whose text has been written but not necessarily rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMeme {
    pub template_id: String,
    pub category: MemeCategory,
    /// Slot name → text, exactly one entry per template slot
    pub text_content: BTreeMap<String, String>,
    pub confidence: f64,
    #[serde(default)]
    pub source_comments: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
}
