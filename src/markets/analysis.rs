//! Aggregates over matched markets for the comparison dashboard

use super::{MarketSnapshot, MatchedMarket, MovieMarkets};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Categories in the order the dashboard shows them; anything else sorts last
const CATEGORY_ORDER: [&str; 11] = [
    "Best Picture",
    "Best Director",
    "Best Actor",
    "Best Actress",
    "Supporting Actor",
    "Supporting Actress",
    "Original Screenplay",
    "Adapted Screenplay",
    "Cinematography",
    "Original Score",
    "Film Editing",
];

/// Categories that do not compare movies head to head
const NON_COMPARABLE: [&str; 2] = ["Other", "Total Wins"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub total_markets: usize,
    /// Mean yes price (cents) over markets that have a price
    pub avg_yes_price: f64,
    pub total_volume: i64,
    pub total_open_interest: i64,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHeadMarket {
    pub price: i64,
    pub volume: i64,
    pub ticker: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub category: String,
    pub leader: Option<String>,
    pub markets: BTreeMap<String, HeadToHeadMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieComparison {
    pub name: String,
    pub director: String,
    pub year: i32,
    pub markets: Vec<MatchedMarket>,
    pub metrics: MarketMetrics,
    pub best_picture_odds: Option<i64>,
    pub best_director_odds: Option<i64>,
    pub best_actor_odds: Option<i64>,
    pub best_actress_odds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total_markets_scanned: usize,
    pub movies_analyzed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub timestamp: DateTime<Utc>,
    pub movies: Vec<MovieComparison>,
    pub head_to_head: Vec<HeadToHead>,
    pub summary: ComparisonSummary,
}

/// Detail view for one movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
    pub name: String,
    pub director: String,
    pub year: i32,
    pub markets: Vec<MatchedMarket>,
    pub metrics: MarketMetrics,
}

/// Aggregate metrics for a list of markets; all zeros when empty
pub fn calculate_metrics(markets: &[MatchedMarket]) -> MarketMetrics {
    if markets.is_empty() {
        return MarketMetrics::default();
    }

    // A zero ask means no offers, not a free contract
    let prices: Vec<i64> = markets.iter().filter_map(|m| m.yes_price).filter(|p| *p != 0).collect();
    let avg_yes_price = if prices.is_empty() {
        0.0
    } else {
        prices.iter().sum::<i64>() as f64 / prices.len() as f64
    };

    let categories: BTreeSet<String> = markets.iter().map(|m| m.category.clone()).collect();

    MarketMetrics {
        total_markets: markets.len(),
        avg_yes_price,
        total_volume: markets.iter().map(|m| m.volume).sum(),
        total_open_interest: markets.iter().map(|m| m.open_interest).sum(),
        categories: categories.into_iter().collect(),
    }
}

/// Yes price of the first market in `category`
pub fn get_key_odds(markets: &[MatchedMarket], category: &str) -> Option<i64> {
    markets
        .iter()
        .find(|m| m.category == category)
        .and_then(|m| m.yes_price)
}

fn category_rank(category: &str) -> usize {
    CATEGORY_ORDER
        .iter()
        .position(|c| *c == category)
        .unwrap_or(CATEGORY_ORDER.len())
}

/// Per-category comparison across movies, using each movie's first market
/// in the category. The leader is the strictly highest positive price.
pub fn build_head_to_head(movies: &[MovieMarkets]) -> Vec<HeadToHead> {
    let categories: BTreeSet<&str> = movies
        .iter()
        .flat_map(|m| m.markets.iter())
        .map(|m| m.category.as_str())
        .filter(|c| !NON_COMPARABLE.contains(c))
        .collect();

    let mut rows: Vec<HeadToHead> = categories
        .into_iter()
        .filter_map(|category| {
            let mut markets = BTreeMap::new();
            let mut max_price = 0;
            let mut leader = None;

            for movie in movies {
                if let Some(market) = movie.markets.iter().find(|m| m.category == category) {
                    let price = market.yes_price.unwrap_or(0);
                    markets.insert(
                        movie.name.clone(),
                        HeadToHeadMarket {
                            price,
                            volume: market.volume,
                            ticker: market.ticker.clone(),
                        },
                    );
                    if price > max_price {
                        max_price = price;
                        leader = Some(movie.name.clone());
                    }
                }
            }

            if markets.is_empty() {
                return None;
            }
            Some(HeadToHead {
                category: category.to_string(),
                leader,
                markets,
            })
        })
        .collect();

    // Stable sort keeps alphabetical order among unranked categories
    rows.sort_by_key(|row| category_rank(&row.category));
    rows
}

/// Full comparison: movies ranked by average yes price, plus head-to-head
pub fn build_comparison(snapshot: &MarketSnapshot, now: DateTime<Utc>) -> Comparison {
    let mut movies: Vec<MovieComparison> = snapshot
        .movies
        .iter()
        .map(|movie| MovieComparison {
            name: movie.name.clone(),
            director: movie.director.clone(),
            year: movie.year,
            markets: movie.markets.clone(),
            metrics: calculate_metrics(&movie.markets),
            best_picture_odds: get_key_odds(&movie.markets, "Best Picture"),
            best_director_odds: get_key_odds(&movie.markets, "Best Director"),
            best_actor_odds: get_key_odds(&movie.markets, "Best Actor"),
            best_actress_odds: get_key_odds(&movie.markets, "Best Actress"),
        })
        .collect();

    movies.sort_by(|a, b| b.metrics.avg_yes_price.total_cmp(&a.metrics.avg_yes_price));

    let summary = ComparisonSummary {
        total_markets_scanned: snapshot.total_markets_scanned,
        movies_analyzed: movies.len(),
    };

    Comparison {
        timestamp: now,
        head_to_head: build_head_to_head(&snapshot.movies),
        movies,
        summary,
    }
}

/// Detail for one movie by exact name
pub fn movie_detail(snapshot: &MarketSnapshot, name: &str) -> Option<MovieDetail> {
    snapshot.movie(name).map(|movie| MovieDetail {
        name: movie.name.clone(),
        director: movie.director.clone(),
        year: movie.year,
        markets: movie.markets.clone(),
        metrics: calculate_metrics(&movie.markets),
    })
}
