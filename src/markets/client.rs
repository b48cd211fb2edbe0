//! Market client for the Kalshi trade API

use super::cache::MarketCache;
use super::error::MarketError;
use super::retry::{with_retry, RetryConfig};
use super::watchlist::{default_watchlist, extract_category, match_keywords, Movie};
use super::{MarketSnapshot, MatchedMarket, MovieMarkets, OscarSeries};
use crate::config::{Config, KalshiApi};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SERIES_KEY: &str = "oscar_series";
const ALL_MARKETS_KEY: &str = "all_markets";

/// Pages per series before we assume the cursor is looping
const MAX_PAGES: usize = 100;

/// Client for fetching Oscar series and markets from Kalshi
pub struct KalshiClient {
    client: Client,
    base_url: String,
    cache: Arc<MarketCache>,
    retry: RetryConfig,
    series_pause: Duration,
    watchlist: Vec<Movie>,
}

/// Raw series response from Kalshi
#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    series: Option<Vec<RawSeries>>,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    #[serde(default)]
    ticker: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    category: Option<String>,
}

/// Raw markets page from Kalshi
#[derive(Debug, Deserialize)]
struct MarketsResponse {
    #[serde(default)]
    markets: Option<Vec<RawMarket>>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Raw market as returned by Kalshi, only the fields we use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub yes_ask: Option<i64>,
    #[serde(default)]
    pub yes_bid: Option<i64>,
    #[serde(default)]
    pub no_ask: Option<i64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub volume_24h: Option<i64>,
    #[serde(default)]
    pub open_interest: Option<i64>,
}

impl KalshiClient {
    pub fn new(config: &Config, cache: Arc<MarketCache>) -> Result<Self> {
        Self::with_base_url(&config.kalshi_base_url, cache)
    }

    pub fn with_base_url(base_url: &str, cache: Arc<MarketCache>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            retry: RetryConfig::default(),
            series_pause: Duration::from_millis(300),
            watchlist: default_watchlist(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Pause between consecutive series fetches
    pub fn with_series_pause(mut self, pause: Duration) -> Self {
        self.series_pause = pause;
        self
    }

    pub fn watchlist(&self) -> &[Movie] {
        &self.watchlist
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, MarketError> {
        debug!("[Kalshi] GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MarketError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::from_response(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MarketError::InvalidResponse(e.to_string()))
    }

    /// Fetch every series whose title mentions the Oscars.
    /// Returns an empty list when the API stays unreachable.
    pub async fn fetch_oscar_series(&self) -> Vec<OscarSeries> {
        if let Some(cached) = self.cache.get::<Vec<OscarSeries>>(SERIES_KEY).await {
            return cached;
        }

        let url = KalshiApi::series_url(&self.base_url);
        let response: SeriesResponse =
            match with_retry(&self.retry, "fetch series", || self.get_json(&url)).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("[Kalshi] Series fetch failed: {}", e);
                    return Vec::new();
                }
            };

        let oscar_series: Vec<OscarSeries> = response
            .series
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.title.to_lowercase().contains("oscar"))
            .map(|s| OscarSeries {
                ticker: s.ticker,
                title: s.title,
                category: s.category,
            })
            .collect();

        info!("[Kalshi] Found {} Oscar series", oscar_series.len());
        self.cache.set(SERIES_KEY, &oscar_series).await;
        oscar_series
    }

    /// Fetch all open markets for a series, following the cursor.
    ///
    /// Each page gets the bounded retry; if a page still fails, whatever was
    /// collected so far is returned and nothing is cached.
    pub async fn fetch_markets_for_series(&self, series_ticker: &str) -> Vec<RawMarket> {
        let cache_key = format!("markets_{}", series_ticker);
        if let Some(cached) = self.cache.get::<Vec<RawMarket>>(&cache_key).await {
            return cached;
        }

        let mut markets = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut url = format!(
                "{}?series_ticker={}&status=open",
                KalshiApi::markets_url(&self.base_url),
                urlencoding::encode(series_ticker)
            );
            if let Some(c) = &cursor {
                url.push_str(&format!("&cursor={}", urlencoding::encode(c)));
            }

            let page: MarketsResponse =
                match with_retry(&self.retry, "fetch markets", || self.get_json(&url)).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(
                            "[Kalshi] Markets fetch for {} failed after {} markets: {}",
                            series_ticker,
                            markets.len(),
                            e
                        );
                        return markets;
                    }
                };

            let batch = page.markets.unwrap_or_default();
            let batch_size = batch.len();
            markets.extend(batch);

            cursor = page.cursor.filter(|c| !c.is_empty());
            if cursor.is_none() || batch_size == 0 {
                debug!("[Kalshi] {}: {} markets", series_ticker, markets.len());
                self.cache.set(&cache_key, &markets).await;
                return markets;
            }
        }

        warn!("[Kalshi] Reached page limit for {}", series_ticker);
        markets
    }

    /// Scan every Oscar series and group matching markets by movie
    pub async fn fetch_all_oscar_markets(&self) -> MarketSnapshot {
        if let Some(cached) = self.cache.get::<MarketSnapshot>(ALL_MARKETS_KEY).await {
            return cached;
        }

        let series = self.fetch_oscar_series().await;
        let mut all_markets = Vec::new();

        for (i, s) in series.iter().enumerate() {
            all_markets.extend(self.fetch_markets_for_series(&s.ticker).await);
            if i + 1 < series.len() {
                tokio::time::sleep(self.series_pause).await;
            }
        }

        let movies = self
            .watchlist
            .iter()
            .map(|movie| match_movie(movie, &all_markets))
            .collect();

        let snapshot = MarketSnapshot {
            timestamp: self.cache.clock().now(),
            total_markets_scanned: all_markets.len(),
            movies,
        };

        info!(
            "[Kalshi] Scanned {} markets across {} series",
            snapshot.total_markets_scanned,
            series.len()
        );

        // An empty scan usually means the API was down; let the next call retry
        if !series.is_empty() {
            self.cache.set(ALL_MARKETS_KEY, &snapshot).await;
        }
        snapshot
    }

    /// Clear cached data (memory and files)
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("[Kalshi] Cache cleared");
    }
}

/// Pick the markets whose title or subtitle names the movie
pub fn match_movie(movie: &Movie, markets: &[RawMarket]) -> MovieMarkets {
    let matched = markets
        .iter()
        .filter_map(|market| {
            let combined = format!("{} {}", market.title, market.subtitle);
            let matched_keywords = match_keywords(&combined, &movie.keywords);
            if matched_keywords.is_empty() {
                return None;
            }
            Some(MatchedMarket {
                ticker: market.ticker.clone(),
                title: market.title.clone(),
                subtitle: market.subtitle.clone(),
                category: extract_category(&market.title).to_string(),
                yes_price: market.yes_ask,
                yes_bid: market.yes_bid,
                no_price: market.no_ask,
                volume: market.volume.unwrap_or(0),
                volume_24h: market.volume_24h.unwrap_or(0),
                open_interest: market.open_interest.unwrap_or(0),
                matched_keywords,
            })
        })
        .collect();

    MovieMarkets {
        name: movie.name.clone(),
        director: movie.director.clone(),
        year: movie.year,
        markets: matched,
    }
}
