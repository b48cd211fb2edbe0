//! Comment lookup over the per-movie sentiment CSVs
//!
//! Files are the `sentiment_results_{movie}.csv` tables written by
//! [`crate::sentiment::report`]. Each file is parsed once and kept in memory.

use crate::sentiment::report::SentimentRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Keywords counted by [`CommentDatabase::key_themes`]
const THEME_KEYWORDS: [&str; 30] = [
    "oscar", "acting", "boring", "amazing", "overrated", "underrated",
    "cinematography", "directing", "script", "story", "plot", "music",
    "score", "hype", "expectations", "trailer", "masterpiece", "mid",
    "peak", "kino", "cinema", "nominated", "award", "performance",
    "visual", "effects", "slow", "fast", "emotional", "predictable",
];

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("No sentiment CSV found for movie: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// Sentiment filter for theme and listing queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentFilter {
    Positive,
    Negative,
    Neutral,
    #[default]
    Any,
}

impl SentimentFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "positive" => Some(SentimentFilter::Positive),
            "negative" => Some(SentimentFilter::Negative),
            "neutral" => Some(SentimentFilter::Neutral),
            "any" | "" => Some(SentimentFilter::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentStats {
    pub total: usize,
    pub avg_compound: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub most_positive: f64,
    pub most_negative: f64,
}

/// File stem used for well-known movie aliases
fn mapped_name(movie: &str) -> Option<&'static str> {
    match movie {
        "obaa" | "one battle after another" => Some("One Battle After Another trailer"),
        "sinners" => Some("Sinners movie trailer"),
        "f1" => Some("F1 movie trailer"),
        "marty supreme" => Some("Marty Supreme movie trailer"),
        _ => None,
    }
}

pub struct CommentDatabase {
    data_dir: PathBuf,
    loaded: RwLock<HashMap<String, Arc<Vec<SentimentRow>>>>,
}

impl CommentDatabase {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolve the CSV for `movie`: alias mapping first, then a
    /// case-insensitive scan of `sentiment_results_*.csv`
    pub fn csv_path(&self, movie: &str) -> Result<PathBuf, CommentError> {
        let key = movie.trim().to_lowercase();
        let name = mapped_name(&key).unwrap_or(movie.trim());
        let direct = self.data_dir.join(format!("sentiment_results_{}.csv", name));
        if direct.exists() {
            return Ok(direct);
        }

        let entries = std::fs::read_dir(&self.data_dir).map_err(|_| CommentError::NotFound(movie.to_string()))?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_lowercase();
                name.starts_with("sentiment_results_") && name.ends_with(".csv") && name.contains(&key)
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next().ok_or_else(|| CommentError::NotFound(movie.to_string()))
    }

    async fn load(&self, movie: &str) -> Result<Arc<Vec<SentimentRow>>, CommentError> {
        let key = movie.trim().to_lowercase();
        if let Some(rows) = self.loaded.read().await.get(&key) {
            return Ok(Arc::clone(rows));
        }

        let path = self.csv_path(movie)?;
        let rows = Arc::new(read_rows(&path)?);
        debug!("[Comments] Loaded {} rows from {}", rows.len(), path.display());

        self.loaded.write().await.insert(key, Arc::clone(&rows));
        Ok(rows)
    }

    /// Drop every cached file so the next query re-reads from disk
    pub async fn invalidate(&self) {
        self.loaded.write().await.clear();
    }

    /// Most negative first, compound within [-1.0, -0.2]
    pub async fn negative_comments(&self, movie: &str, limit: usize) -> Result<Vec<String>, CommentError> {
        self.in_range(movie, limit, -1.0, -0.2, false).await
    }

    /// Most positive first, compound within [0.3, 1.0]
    pub async fn positive_comments(&self, movie: &str, limit: usize) -> Result<Vec<String>, CommentError> {
        self.in_range(movie, limit, 0.3, 1.0, true).await
    }

    async fn in_range(&self, movie: &str, limit: usize, min: f64, max: f64, descending: bool) -> Result<Vec<String>, CommentError> {
        let rows = self.load(movie).await?;
        let mut matched: Vec<&SentimentRow> = rows.iter().filter(|r| (min..=max).contains(&r.compound)).collect();
        if descending {
            matched.sort_by(|a, b| b.compound.total_cmp(&a.compound));
        } else {
            matched.sort_by(|a, b| a.compound.total_cmp(&b.compound));
        }
        Ok(matched.into_iter().take(limit).map(|r| r.full_comment.clone()).collect())
    }

    /// Strongest opinions in either direction
    pub async fn controversial_comments(&self, movie: &str, limit: usize) -> Result<Vec<String>, CommentError> {
        let rows = self.load(movie).await?;
        let mut sorted: Vec<&SentimentRow> = rows.iter().collect();
        sorted.sort_by(|a, b| b.compound.abs().total_cmp(&a.compound.abs()));
        Ok(sorted.into_iter().take(limit).map(|r| r.full_comment.clone()).collect())
    }

    /// Comments mentioning `theme`, in file order
    pub async fn theme_comments(
        &self,
        movie: &str,
        theme: &str,
        filter: SentimentFilter,
        limit: usize,
    ) -> Result<Vec<String>, CommentError> {
        let rows = self.load(movie).await?;
        let theme = theme.to_lowercase();
        Ok(rows
            .iter()
            .filter(|r| r.full_comment.to_lowercase().contains(&theme))
            .filter(|r| match filter {
                SentimentFilter::Positive => r.compound > 0.2,
                SentimentFilter::Negative => r.compound < -0.2,
                _ => true,
            })
            .take(limit)
            .map(|r| r.full_comment.clone())
            .collect())
    }

    /// Rows whose stored label matches `filter`
    pub async fn comments(&self, movie: &str, filter: SentimentFilter) -> Result<Vec<SentimentRow>, CommentError> {
        let rows = self.load(movie).await?;
        let wanted = match filter {
            SentimentFilter::Any => return Ok(rows.as_ref().clone()),
            SentimentFilter::Positive => "positive",
            SentimentFilter::Negative => "negative",
            SentimentFilter::Neutral => "neutral",
        };
        Ok(rows.iter().filter(|r| r.sentiment.eq_ignore_ascii_case(wanted)).cloned().collect())
    }

    pub async fn stats(&self, movie: &str) -> Result<CommentStats, CommentError> {
        let rows = self.load(movie).await?;
        if rows.is_empty() {
            return Ok(CommentStats::default());
        }

        let count = |label: &str| rows.iter().filter(|r| r.sentiment.eq_ignore_ascii_case(label)).count();
        let compounds = rows.iter().map(|r| r.compound);

        Ok(CommentStats {
            total: rows.len(),
            avg_compound: compounds.clone().sum::<f64>() / rows.len() as f64,
            positive_count: count("positive"),
            negative_count: count("negative"),
            neutral_count: count("neutral"),
            most_positive: compounds.clone().fold(f64::MIN, f64::max),
            most_negative: compounds.fold(f64::MAX, f64::min),
        })
    }

    /// Most frequent of the fixed theme keywords, by substring occurrences
    pub async fn key_themes(&self, movie: &str, top_n: usize) -> Result<Vec<String>, CommentError> {
        let rows = self.load(movie).await?;
        let all_text = rows.iter().map(|r| r.full_comment.to_lowercase()).collect::<Vec<_>>().join(" ");

        let mut counts: Vec<(&str, usize)> = THEME_KEYWORDS
            .iter()
            .map(|k| (*k, all_text.matches(k).count()))
            .filter(|(_, n)| *n > 0)
            .collect();
        // Stable: ties keep keyword-list order
        counts.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(counts.into_iter().take(top_n).map(|(k, _)| k.to_string()).collect())
    }
}

fn read_rows(path: &Path) -> Result<Vec<SentimentRow>, CommentError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| CommentError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut rows = Vec::new();
    for record in reader.deserialize::<SentimentRow>() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => warn!("[Comments] Skipping malformed row in {}: {}", path.display(), e),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::report::write_results_csv;
    use crate::sentiment::tests::StubScorer;
    use crate::sentiment::analyze_comments;

    fn write_movie(dir: &Path, name: &str, comments: &[(&str, f64)]) {
        let scorer = StubScorer::new(comments);
        let texts: Vec<&str> = comments.iter().map(|(t, _)| *t).collect();
        let scored = analyze_comments(&texts, &scorer);
        write_results_csv(&dir.join(format!("sentiment_results_{}.csv", name)), &scored).unwrap();
    }

    fn fixture() -> (tempfile::TempDir, CommentDatabase) {
        let dir = tempfile::tempdir().unwrap();
        write_movie(
            dir.path(),
            "Sinners movie trailer",
            &[
                ("overrated hype, boring", -0.7),
                ("mid at best", -0.3),
                ("the acting is amazing", 0.8),
                ("solid trailer", 0.4),
                ("saw the trailer", 0.0),
                ("boring boring", -0.1),
            ],
        );
        write_movie(dir.path(), "Hamnet trailer", &[("lovely", 0.5)]);
        let db = CommentDatabase::new(dir.path());
        (dir, db)
    }

    #[tokio::test]
    async fn test_negative_and_positive_ranges() {
        let (_dir, db) = fixture();
        let neg = db.negative_comments("Sinners", 10).await.unwrap();
        assert_eq!(neg, vec!["overrated hype, boring", "mid at best"]);

        let pos = db.positive_comments("sinners", 1).await.unwrap();
        assert_eq!(pos, vec!["the acting is amazing"]);
    }

    #[tokio::test]
    async fn test_controversial_and_theme() {
        let (_dir, db) = fixture();
        let top = db.controversial_comments("Sinners", 2).await.unwrap();
        assert_eq!(top, vec!["the acting is amazing", "overrated hype, boring"]);

        let themed = db.theme_comments("Sinners", "TRAILER", SentimentFilter::Any, 10).await.unwrap();
        assert_eq!(themed.len(), 2);
        let themed_pos = db.theme_comments("Sinners", "trailer", SentimentFilter::Positive, 10).await.unwrap();
        assert_eq!(themed_pos, vec!["solid trailer"]);
    }

    #[tokio::test]
    async fn test_stats_and_themes() {
        let (_dir, db) = fixture();
        let stats = db.stats("Sinners").await.unwrap();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.positive_count, 2);
        assert_eq!(stats.negative_count, 3);
        assert_eq!(stats.neutral_count, 1);
        assert_eq!(stats.most_positive, 0.8);
        assert_eq!(stats.most_negative, -0.7);

        let themes = db.key_themes("Sinners", 2).await.unwrap();
        assert_eq!(themes, vec!["boring", "trailer"]);
    }

    #[tokio::test]
    async fn test_fallback_scan_and_not_found() {
        let (_dir, db) = fixture();
        assert_eq!(db.stats("hamnet").await.unwrap().total, 1);
        assert!(matches!(db.stats("Marty Supreme").await, Err(CommentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_filtered_listing() {
        let (_dir, db) = fixture();
        let negatives = db.comments("Sinners", SentimentFilter::Negative).await.unwrap();
        assert_eq!(negatives.len(), 3);
        assert_eq!(SentimentFilter::parse("Positive"), Some(SentimentFilter::Positive));
        assert_eq!(SentimentFilter::parse("weird"), None);
    }
}
