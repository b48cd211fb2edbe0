//! Market comparison endpoints

use super::{api_error, ApiError};
use crate::api::server::AppState;
use crate::markets::analysis::{movie_detail, MovieDetail};
use crate::markets::{build_comparison, Comparison};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "healthy",
        timestamp: Utc::now(),
    })
}

/// Full comparison across the watchlist
pub async fn comparison(State(state): State<AppState>) -> Json<Comparison> {
    let snapshot = state.kalshi.fetch_all_oscar_markets().await;
    Json(build_comparison(&snapshot, Utc::now()))
}

pub async fn movie(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<MovieDetail>, ApiError> {
    let snapshot = state.kalshi.fetch_all_oscar_markets().await;
    movie_detail(&snapshot, &name)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Movie not found: {}", name)))
}

/// Drop cached market data so the next request refetches
pub async fn refresh(State(state): State<AppState>) -> Json<StatusResponse> {
    state.kalshi.clear_cache().await;
    Json(StatusResponse {
        status: "cache cleared",
        timestamp: Utc::now(),
    })
}
