//! Per-template meme text generation

use super::prompts::{system_prompt, user_prompt};
use super::{GenerationRequest, MemeError};
use crate::comments::{CommentDatabase, CommentError, CommentStats};
use crate::llm::{LlmClient, LlmRequest};
use crate::templates::TemplateRegistry;
use crate::types::{GeneratedMeme, MemeCategory, TemplateEntry};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Comments fetched per movie and polarity
const CONTEXT_COMMENTS: usize = 10;
const KEY_THEMES: usize = 5;
/// Source comments attached to each meme
const MEME_SOURCES: usize = 3;

/// Comment material shared by every meme in a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemeContext {
    pub target_positive: Vec<String>,
    pub target_negative: Vec<String>,
    pub competitor_positive: Vec<String>,
    pub competitor_negative: Vec<String>,
    pub target_stats: CommentStats,
    pub competitor_stats: CommentStats,
    pub key_themes: Vec<String>,
    pub source_comments: Vec<String>,
    pub campaign_goal: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemeFailure {
    pub template_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemeBatch {
    pub memes: Vec<GeneratedMeme>,
    pub failures: Vec<MemeFailure>,
    pub total_generated: usize,
    pub category_breakdown: BTreeMap<String, usize>,
}

/// Start at 1.0; -0.2 per slot over the limit, -0.1 per slot under 5 chars
pub fn confidence(text: &BTreeMap<String, String>, max_chars: usize) -> f64 {
    let mut score = 1.0;
    for value in text.values() {
        let len = value.chars().count();
        if len > max_chars {
            score -= 0.2;
        }
        if len < 5 {
            score -= 0.1;
        }
    }
    f64::clamp(score, 0.0, 1.0)
}

/// Exactly one text per template slot
fn extract_slots(entry: &TemplateEntry, value: &Value) -> Result<BTreeMap<String, String>, MemeError> {
    entry
        .slot_names
        .iter()
        .map(|slot| {
            value
                .get(slot)
                .and_then(Value::as_str)
                .map(|text| (slot.clone(), text.trim().to_string()))
                .ok_or_else(|| MemeError::MissingSlot {
                    template: entry.id.clone(),
                    slot: slot.clone(),
                })
        })
        .collect()
}

fn or_empty(result: Result<Vec<String>, CommentError>, movie: &str) -> Vec<String> {
    result.unwrap_or_else(|e| {
        warn!("[Memes] No comments for {}: {}", movie, e);
        Vec::new()
    })
}

pub struct MemePipeline {
    llm: Arc<dyn LlmClient>,
    comments: Arc<CommentDatabase>,
    model: String,
}

impl MemePipeline {
    pub fn new(llm: Arc<dyn LlmClient>, comments: Arc<CommentDatabase>, model: impl Into<String>) -> Self {
        Self {
            llm,
            comments,
            model: model.into(),
        }
    }

    pub async fn build_context(&self, request: &GenerationRequest) -> MemeContext {
        let target = request.target_movie.as_str();
        let competitor = request.competitor_movie.as_str();
        let db = &self.comments;

        let target_positive = or_empty(db.positive_comments(target, CONTEXT_COMMENTS).await, target);
        let target_negative = or_empty(db.negative_comments(target, CONTEXT_COMMENTS).await, target);
        let competitor_positive = or_empty(db.positive_comments(competitor, CONTEXT_COMMENTS).await, competitor);
        let competitor_negative = or_empty(db.negative_comments(competitor, CONTEXT_COMMENTS).await, competitor);

        let target_stats = db.stats(target).await.unwrap_or_default();
        let competitor_stats = db.stats(competitor).await.unwrap_or_default();

        let mut key_themes = request.custom_themes.clone();
        key_themes.extend(db.key_themes(competitor, KEY_THEMES).await.unwrap_or_default());

        let source_comments = match request.category {
            MemeCategory::ProObaa => target_positive
                .iter()
                .take(3)
                .chain(competitor_negative.iter().take(2))
                .cloned()
                .collect(),
            MemeCategory::AntiSinners => competitor_negative
                .iter()
                .take(3)
                .chain(target_positive.iter().take(2))
                .cloned()
                .collect(),
        };

        MemeContext {
            target_positive,
            target_negative,
            competitor_positive,
            competitor_negative,
            target_stats,
            competitor_stats,
            key_themes,
            source_comments,
            campaign_goal: request.goal(),
        }
    }

    pub async fn generate_meme(
        &self,
        registry: &TemplateRegistry,
        entry: &TemplateEntry,
        request: &GenerationRequest,
        ctx: &MemeContext,
    ) -> Result<GeneratedMeme, MemeError> {
        let schema_name = registry
            .binding(&entry.id)
            .and_then(|b| b.get("output_model"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_output", entry.id));

        let llm_request = LlmRequest::new(
            system_prompt(entry, registry.prompt(&entry.id)),
            user_prompt(entry, request, ctx),
            schema_name,
            registry.output_schema(entry),
        )
        .with_model(self.model.clone());

        let value = self.llm.complete_json(llm_request).await.map_err(|source| MemeError::Llm {
            template: entry.id.clone(),
            source,
        })?;

        let text_content = extract_slots(entry, &value)?;
        let reasoning = value
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(GeneratedMeme {
            template_id: entry.id.clone(),
            category: request.category,
            confidence: confidence(&text_content, entry.max_chars_per_slot),
            text_content,
            source_comments: ctx.source_comments.iter().take(MEME_SOURCES).cloned().collect(),
            reasoning,
            generated_at: Utc::now(),
        })
    }

    /// Templates the request asks for, in order, capped at `num_memes`
    pub fn select_templates<'a>(
        registry: &'a TemplateRegistry,
        request: &GenerationRequest,
    ) -> Result<Vec<&'a TemplateEntry>, MemeError> {
        let mut selected = match &request.templates {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .map(|id| registry.get(id).ok_or_else(|| MemeError::UnknownTemplate(id.clone())))
                .collect::<Result<Vec<_>, _>>()?,
            _ => registry.usable(),
        };
        if selected.is_empty() {
            return Err(MemeError::NoTemplates);
        }
        selected.truncate(request.num_memes);
        Ok(selected)
    }

    pub async fn generate_batch(
        &self,
        registry: &TemplateRegistry,
        request: &GenerationRequest,
    ) -> Result<MemeBatch, MemeError> {
        request.validate()?;
        let templates = Self::select_templates(registry, request)?;
        let ctx = self.build_context(request).await;

        info!(
            "[Memes] Generating {} {} memes with {}",
            templates.len(),
            request.category,
            self.llm.name()
        );

        let results = join_all(
            templates
                .iter()
                .map(|entry| self.generate_meme(registry, entry, request, &ctx)),
        )
        .await;

        let mut memes = Vec::new();
        let mut failures = Vec::new();
        for (entry, result) in templates.iter().zip(results) {
            match result {
                Ok(meme) => memes.push(meme),
                Err(e) => {
                    warn!("[Memes] {}", e);
                    failures.push(MemeFailure {
                        template_id: entry.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut category_breakdown = BTreeMap::new();
        category_breakdown.insert(request.category.as_str().to_string(), memes.len());

        Ok(MemeBatch {
            total_generated: memes.len(),
            memes,
            failures,
            category_breakdown,
        })
    }
}
