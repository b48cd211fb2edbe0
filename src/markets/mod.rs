//! Kalshi Oscar markets
//!
//! Fetches Oscar series and their open markets from Kalshi, matches them to
//! the watched movies, and reshapes the result for the comparison dashboard.

pub mod analysis;
pub mod cache;
pub mod client;
pub mod error;
pub mod retry;
pub mod watchlist;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use analysis::{build_comparison, build_head_to_head, calculate_metrics, get_key_odds, Comparison, HeadToHead, MarketMetrics};
pub use cache::{Clock, ManualClock, MarketCache, SystemClock};
pub use client::KalshiClient;
pub use error::MarketError;
pub use retry::RetryConfig;
pub use watchlist::{default_watchlist, extract_category, match_keywords, Movie};

/// A Kalshi series whose title mentions the Oscars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscarSeries {
    pub ticker: String,
    pub title: String,
    pub category: Option<String>,
}

/// A market matched to one of the watched movies. Prices are in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedMarket {
    pub ticker: String,
    pub title: String,
    pub subtitle: String,
    pub category: String,
    pub yes_price: Option<i64>,
    pub yes_bid: Option<i64>,
    pub no_price: Option<i64>,
    pub volume: i64,
    pub volume_24h: i64,
    pub open_interest: i64,
    pub matched_keywords: Vec<String>,
}

/// All markets matched to one movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieMarkets {
    pub name: String,
    pub director: String,
    pub year: i32,
    pub markets: Vec<MatchedMarket>,
}

/// One full scan of the Oscar series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_markets_scanned: usize,
    /// In watchlist order
    pub movies: Vec<MovieMarkets>,
}

impl MarketSnapshot {
    pub fn movie(&self, name: &str) -> Option<&MovieMarkets> {
        self.movies.iter().find(|m| m.name == name)
    }
}
