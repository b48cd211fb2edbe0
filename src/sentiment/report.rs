//! Sentiment outputs: per-movie CSVs and the dashboard JSON payload

use super::compare::{compare_movies, SentimentComparison};
use super::ingest::CommentExport;
use super::{analyze_comments, calculate_stats, get_top_comments, truncate_chars, PolarityScorer, ScoredComment, SentimentStats, TopComments};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One row of `sentiment_results_{movie}.csv`; the comment database reads these back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRow {
    pub comment: String,
    pub full_comment: String,
    pub negative: f64,
    pub neutral: f64,
    pub positive: f64,
    pub compound: f64,
    pub sentiment: String,
}

impl From<&ScoredComment> for SentimentRow {
    fn from(c: &ScoredComment) -> Self {
        Self {
            comment: truncate_chars(&c.text, 100),
            full_comment: c.text.clone(),
            negative: c.scores.neg,
            neutral: c.scores.neu,
            positive: c.scores.pos,
            compound: c.scores.compound,
            sentiment: c.sentiment.to_string(),
        }
    }
}

/// One row of `sentiment_summary_{movie}.csv`
#[derive(Debug, Clone, Serialize)]
struct VideoSummaryRow {
    video: String,
    total: usize,
    positive: usize,
    negative: usize,
    neutral: usize,
    positive_pct: f64,
    negative_pct: f64,
    neutral_pct: f64,
    avg_compound: f64,
}

impl VideoSummaryRow {
    fn new(video: &VideoAnalysis) -> Self {
        let s = &video.stats;
        Self {
            video: truncate_chars(&video.title, 50),
            total: s.total,
            positive: s.positive,
            negative: s.negative,
            neutral: s.neutral,
            positive_pct: s.positive_pct,
            negative_pct: s.negative_pct,
            neutral_pct: s.neutral_pct,
            avg_compound: s.avg_compound,
        }
    }
}

/// Per-video breakdown of one export
#[derive(Debug, Clone)]
pub struct VideoAnalysis {
    pub title: String,
    pub stats: SentimentStats,
    pub top: TopComments,
}

/// Result of scoring one YouTube export
#[derive(Debug, Clone)]
pub struct ExportAnalysis {
    pub movie: String,
    pub videos: Vec<VideoAnalysis>,
    pub comments: Vec<ScoredComment>,
    pub overall: SentimentStats,
}

/// Replace characters that are not allowed in file names
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Score an export video by video
pub fn analyze_export(export: &CommentExport, scorer: &dyn PolarityScorer, top_n: usize) -> ExportAnalysis {
    let mut comments = Vec::new();
    let mut videos = Vec::new();

    for (title, texts) in export.videos() {
        let scored = analyze_comments(&texts, scorer);
        videos.push(VideoAnalysis {
            title: title.clone(),
            stats: calculate_stats(&scored),
            top: get_top_comments(&scored, top_n),
        });
        comments.extend(scored);
    }

    ExportAnalysis {
        movie: sanitize_filename(&export.query),
        overall: calculate_stats(&comments),
        videos,
        comments,
    }
}

/// Write the scored comments and per-video summary CSVs, returning their paths
pub fn write_export_csvs(analysis: &ExportAnalysis, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let results_path = out_dir.join(format!("sentiment_results_{}.csv", analysis.movie));
    write_results_csv(&results_path, &analysis.comments)?;

    let summary_path = out_dir.join(format!("sentiment_summary_{}.csv", analysis.movie));
    let mut writer = csv::Writer::from_path(&summary_path)
        .with_context(|| format!("Failed to create {}", summary_path.display()))?;
    for video in &analysis.videos {
        writer.serialize(VideoSummaryRow::new(video))?;
    }
    writer.flush()?;

    Ok((results_path, summary_path))
}

pub fn write_results_csv(path: &Path, comments: &[ScoredComment]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for comment in comments {
        writer.serialize(SentimentRow::from(comment))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsBlock {
    pub stats: SentimentStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBlock {
    pub stats: SentimentStats,
    pub top_comments: TopComments,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieSentiment {
    pub name: String,
    pub youtube: SourceBlock,
    pub reddit: SourceBlock,
    pub combined: SourceBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTotals {
    pub youtube: StatsBlock,
    pub reddit: StatsBlock,
}

/// Payload embedded in the sentiment dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentDashboard {
    pub generated_at: DateTime<Utc>,
    pub sources: SourceTotals,
    pub global: StatsBlock,
    pub movies: Vec<MovieSentiment>,
    /// Both sources combined, per movie
    pub comparison: SentimentComparison,
}

fn source_block(comments: &[ScoredComment], top_n: usize) -> SourceBlock {
    SourceBlock {
        stats: calculate_stats(comments),
        top_comments: get_top_comments(comments, top_n),
    }
}

/// Combine per-source results into the dashboard payload, movies in name order
pub fn build_dashboard(
    youtube: &BTreeMap<String, Vec<ScoredComment>>,
    reddit: &BTreeMap<String, Vec<ScoredComment>>,
    generated_at: DateTime<Utc>,
) -> SentimentDashboard {
    let names: BTreeSet<&String> = youtube.keys().chain(reddit.keys()).collect();
    let empty = Vec::new();

    let mut all_youtube = Vec::new();
    let mut all_reddit = Vec::new();
    let mut movies = Vec::with_capacity(names.len());
    let mut combined_by_movie = BTreeMap::new();

    for name in names {
        let yt = youtube.get(name).unwrap_or(&empty);
        let rd = reddit.get(name).unwrap_or(&empty);
        let combined: Vec<ScoredComment> = yt.iter().chain(rd.iter()).cloned().collect();

        movies.push(MovieSentiment {
            name: name.clone(),
            youtube: source_block(yt, 3),
            reddit: source_block(rd, 3),
            combined: source_block(&combined, 5),
        });
        combined_by_movie.insert(name.clone(), combined);

        all_youtube.extend(yt.iter().cloned());
        all_reddit.extend(rd.iter().cloned());
    }

    let all: Vec<ScoredComment> = all_youtube.iter().chain(all_reddit.iter()).cloned().collect();

    SentimentDashboard {
        generated_at,
        sources: SourceTotals {
            youtube: StatsBlock { stats: calculate_stats(&all_youtube) },
            reddit: StatsBlock { stats: calculate_stats(&all_reddit) },
        },
        global: StatsBlock { stats: calculate_stats(&all) },
        movies,
        comparison: compare_movies(&combined_by_movie),
    }
}
