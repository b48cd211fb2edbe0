//! Meme generation and comment lookup endpoints

use super::{api_error, internal, ApiError};
use crate::api::server::AppState;
use crate::comments::{CommentError, SentimentFilter};
use crate::memes::pipeline::MemeFailure;
use crate::memes::{list_generated, GeneratedFile, GenerationRequest, MemeError};
use crate::sentiment::report::SentimentRow;
use crate::types::{GeneratedMeme, MemeCategory, TemplateEntry};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_COMMENT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListMemesQuery {
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemeListResponse {
    pub memes: Vec<GeneratedFile>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct RenderedMeme {
    #[serde(flatten)]
    pub meme: GeneratedMeme,
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub memes: Vec<RenderedMeme>,
    pub failures: Vec<MemeFailure>,
    pub total_generated: usize,
    pub category_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    pub sentiment: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub movie: String,
    pub total: usize,
    pub comments: Vec<SentimentRow>,
}

fn parse_category(value: &str) -> Result<MemeCategory, ApiError> {
    MemeCategory::parse(value).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid category '{}', expected pro_obaa or anti_sinners", value),
        )
    })
}

pub async fn list_memes(
    State(state): State<AppState>,
    Query(query): Query<ListMemesQuery>,
) -> Result<Json<MemeListResponse>, ApiError> {
    let category = query.category.as_deref().map(parse_category).transpose()?;
    let memes = list_generated(&state.config.output_dir, category);
    Ok(Json(MemeListResponse {
        total: memes.len(),
        memes,
    }))
}

/// Templates with a layout for every slot
pub async fn generation_templates(State(state): State<AppState>) -> Json<Vec<TemplateEntry>> {
    let registry = state.registry.read().await;
    Json(registry.usable().into_iter().cloned().collect())
}

/// Write text for each selected template, then render what was written
pub async fn generate_memes(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let request: GenerationRequest =
        serde_json::from_value(body).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    // Snapshot so a concurrent finalize cannot change templates mid-batch
    let registry = state.registry.read().await.clone();

    let batch = state
        .memes
        .generate_batch(&registry, &request)
        .await
        .map_err(|e| match e {
            MemeError::Llm { .. } => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
            _ => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        })?;

    let mut memes = Vec::with_capacity(batch.memes.len());
    for (i, meme) in batch.memes.into_iter().enumerate() {
        let Some(entry) = registry.get(&meme.template_id).cloned() else {
            continue;
        };
        let layout = registry.layout(&entry.id).cloned();
        let renderer = Arc::clone(&state.renderer);
        let to_render = meme.clone();

        let rendered = tokio::task::spawn_blocking(move || {
            renderer.render(&to_render, &entry, layout.as_ref(), i + 1)
        })
        .await
        .map_err(internal)?;

        let (image_url, render_error) = match rendered {
            Ok(path) => {
                let relative = path.strip_prefix(&state.config.output_dir).unwrap_or(&path);
                let url = format!("/memes/{}", relative.to_string_lossy().replace('\\', "/"));
                (Some(url), None)
            }
            Err(e) => {
                warn!("[Memes] Render failed for {}: {}", meme.template_id, e);
                (None, Some(e.to_string()))
            }
        };
        memes.push(RenderedMeme {
            meme,
            image_url,
            render_error,
        });
    }

    Ok(Json(GenerateResponse {
        memes,
        failures: batch.failures,
        total_generated: batch.total_generated,
        category_breakdown: batch.category_breakdown,
    }))
}

pub async fn movie_comments(
    State(state): State<AppState>,
    Path(movie): Path<String>,
    Query(query): Query<CommentsQuery>,
) -> Result<Json<CommentsResponse>, ApiError> {
    let filter = match query.sentiment.as_deref() {
        None | Some("") => SentimentFilter::Any,
        Some(s) => SentimentFilter::parse(s)
            .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("Invalid sentiment filter: {}", s)))?,
    };

    let mut comments = state.comments.comments(&movie, filter).await.map_err(|e| match e {
        CommentError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        CommentError::Read { .. } => internal(e),
    })?;
    let total = comments.len();
    comments.truncate(query.limit.unwrap_or(DEFAULT_COMMENT_LIMIT));

    Ok(Json(CommentsResponse {
        movie,
        total,
        comments,
    }))
}
