//! Cross-movie comparison of scored comments
//!
//! Reads back the `sentiment_results_*.csv` files (or takes scored comments
//! directly), reduces each movie to distribution statistics and ranks the
//! movies by positivity, mean compound and comment volume.

use super::report::SentimentRow;
use super::{calculate_stats, round_to, PolarityScores, ScoredComment};
use crate::types::Sentiment;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RESULTS_PREFIX: &str = "sentiment_results_";

/// One movie's row of `movie_comparison.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieComparison {
    pub movie: String,
    pub total_comments: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
    pub avg_compound: f64,
    pub median_compound: f64,
    /// Sample standard deviation; 0 with fewer than two comments
    pub std_compound: f64,
    pub min_compound: f64,
    pub max_compound: f64,
}

/// Movie names, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rankings {
    pub by_positivity: Vec<String>,
    pub by_avg_compound: Vec<String>,
    pub by_engagement: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentComparison {
    /// Sorted by average compound, highest first
    pub movies: Vec<MovieComparison>,
    pub rankings: Rankings,
}

impl SentimentComparison {
    pub fn most_positive(&self) -> Option<&MovieComparison> {
        first_max(&self.movies, |m| m.positive_pct)
    }

    /// Highest negative share
    pub fn most_controversial(&self) -> Option<&MovieComparison> {
        first_max(&self.movies, |m| m.negative_pct)
    }

    pub fn most_engaged(&self) -> Option<&MovieComparison> {
        first_max(&self.movies, |m| m.total_comments as f64)
    }
}

fn first_max(movies: &[MovieComparison], key: impl Fn(&MovieComparison) -> f64) -> Option<&MovieComparison> {
    movies
        .iter()
        .fold(None, |best: Option<&MovieComparison>, m| match best {
            Some(b) if key(b) >= key(m) => Some(b),
            _ => Some(m),
        })
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

pub fn movie_comparison(movie: &str, comments: &[ScoredComment]) -> MovieComparison {
    let stats = calculate_stats(comments);
    let mut compounds: Vec<f64> = comments.iter().map(ScoredComment::compound).collect();
    compounds.sort_by(f64::total_cmp);

    MovieComparison {
        movie: movie.to_string(),
        total_comments: stats.total,
        positive_count: stats.positive,
        negative_count: stats.negative,
        neutral_count: stats.neutral,
        positive_pct: stats.positive_pct,
        negative_pct: stats.negative_pct,
        neutral_pct: stats.neutral_pct,
        avg_compound: stats.avg_compound,
        median_compound: round_to(median(&compounds), 3),
        std_compound: round_to(sample_std(&compounds), 3),
        min_compound: round_to(compounds.first().copied().unwrap_or_default(), 3),
        max_compound: round_to(compounds.last().copied().unwrap_or_default(), 3),
    }
}

fn ranked_by(movies: &[MovieComparison], key: impl Fn(&MovieComparison) -> f64) -> Vec<String> {
    let mut sorted: Vec<&MovieComparison> = movies.iter().collect();
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)));
    sorted.into_iter().map(|m| m.movie.clone()).collect()
}

/// Compare every movie that has at least one scored comment
pub fn compare_movies(movies: &BTreeMap<String, Vec<ScoredComment>>) -> SentimentComparison {
    let mut rows: Vec<MovieComparison> = movies
        .iter()
        .filter(|(_, comments)| !comments.is_empty())
        .map(|(name, comments)| movie_comparison(name, comments))
        .collect();
    rows.sort_by(|a, b| b.avg_compound.total_cmp(&a.avg_compound));

    let rankings = Rankings {
        by_positivity: ranked_by(&rows, |m| m.positive_pct),
        by_avg_compound: rows.iter().map(|m| m.movie.clone()).collect(),
        by_engagement: ranked_by(&rows, |m| m.total_comments as f64),
    };

    SentimentComparison { movies: rows, rankings }
}

impl From<SentimentRow> for ScoredComment {
    fn from(row: SentimentRow) -> Self {
        let sentiment = match row.sentiment.to_lowercase().as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            "neutral" => Sentiment::Neutral,
            _ => Sentiment::from_compound(row.compound),
        };
        ScoredComment {
            text: row.full_comment,
            scores: PolarityScores {
                neg: row.negative,
                neu: row.neutral,
                pos: row.positive,
                compound: row.compound,
            },
            sentiment,
        }
    }
}

/// Read every `sentiment_results_{movie}.csv` in `dir`, keyed by movie
pub fn load_results_dir(dir: &Path) -> Result<BTreeMap<String, Vec<ScoredComment>>> {
    let mut movies = BTreeMap::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();

    for path in paths {
        let Some(movie) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(RESULTS_PREFIX))
            .and_then(|n| n.strip_suffix(".csv"))
            .map(str::to_string)
        else {
            continue;
        };

        let mut reader = csv::Reader::from_path(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut comments = Vec::new();
        for row in reader.deserialize::<SentimentRow>() {
            match row {
                Ok(row) => comments.push(ScoredComment::from(row)),
                Err(e) => warn!("[Compare] Skipping bad row in {}: {}", path.display(), e),
            }
        }
        movies.insert(movie, comments);
    }

    info!("[Compare] Loaded {} movies from {}", movies.len(), dir.display());
    Ok(movies)
}

/// Write `movie_comparison.csv` and `movie_comparison.json` into `dir`
pub fn write_comparison(comparison: &SentimentComparison, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let csv_path = dir.join("movie_comparison.csv");
    let mut writer =
        csv::Writer::from_path(&csv_path).with_context(|| format!("Failed to create {}", csv_path.display()))?;
    for row in &comparison.movies {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let json_path = dir.join("movie_comparison.json");
    std::fs::write(&json_path, serde_json::to_string_pretty(comparison)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    Ok((csv_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::analyze_comments;
    use crate::sentiment::report::write_results_csv;
    use crate::sentiment::tests::StubScorer;

    fn movies() -> BTreeMap<String, Vec<ScoredComment>> {
        let scorer = StubScorer::new(&[("a1", 0.5), ("a2", -0.5), ("a3", 0.1), ("b1", 0.8), ("b2", 0.6)]);
        BTreeMap::from([
            ("Alpha".to_string(), analyze_comments(&["a1", "a2", "a3"], &scorer)),
            ("Beta".to_string(), analyze_comments(&["b1", "b2"], &scorer)),
            ("Empty".to_string(), vec![]),
        ])
    }

    #[test]
    fn test_distribution_stats() {
        let comparison = compare_movies(&movies());
        assert_eq!(comparison.movies.len(), 2);

        let alpha = comparison.movies.iter().find(|m| m.movie == "Alpha").unwrap();
        assert_eq!(alpha.total_comments, 3);
        assert_eq!(alpha.positive_count, 2);
        assert_eq!(alpha.median_compound, 0.1);
        assert_eq!(alpha.std_compound, 0.503);
        assert_eq!(alpha.min_compound, -0.5);
        assert_eq!(alpha.max_compound, 0.5);

        let beta = comparison.movies.iter().find(|m| m.movie == "Beta").unwrap();
        assert_eq!(beta.median_compound, 0.7);
        assert_eq!(beta.std_compound, 0.141);
    }

    #[test]
    fn test_rankings_and_insights() {
        let comparison = compare_movies(&movies());
        assert_eq!(comparison.rankings.by_avg_compound, vec!["Beta", "Alpha"]);
        assert_eq!(comparison.rankings.by_positivity, vec!["Beta", "Alpha"]);
        assert_eq!(comparison.rankings.by_engagement, vec!["Alpha", "Beta"]);

        assert_eq!(comparison.most_positive().unwrap().movie, "Beta");
        assert_eq!(comparison.most_controversial().unwrap().movie, "Alpha");
        assert_eq!(comparison.most_engaged().unwrap().movie, "Alpha");
        assert!(SentimentComparison::default().most_positive().is_none());
    }

    #[test]
    fn test_single_comment_has_zero_spread() {
        let scorer = StubScorer::new(&[("x", 0.4)]);
        let row = movie_comparison("Solo", &analyze_comments(&["x"], &scorer));
        assert_eq!(row.std_compound, 0.0);
        assert_eq!(row.median_compound, 0.4);
    }

    #[test]
    fn test_load_results_and_write() {
        let dir = tempfile::tempdir().unwrap();
        for (movie, comments) in movies() {
            write_results_csv(&dir.path().join(format!("sentiment_results_{}.csv", movie)), &comments).unwrap();
        }
        std::fs::write(dir.path().join("sentiment_summary_Alpha.csv"), "video,total\n").unwrap();

        let loaded = load_results_dir(dir.path()).unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["Alpha", "Beta", "Empty"]);
        assert_eq!(loaded["Alpha"][1].sentiment, Sentiment::Negative);
        assert_eq!(compare_movies(&loaded), compare_movies(&movies()));

        let (csv_path, json_path) = write_comparison(&compare_movies(&loaded), dir.path()).unwrap();
        let header = std::fs::read_to_string(csv_path).unwrap();
        assert!(header.starts_with("movie,total_comments,positive_count"));
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(json["rankings"]["by_engagement"][0], "Alpha");
    }
}
