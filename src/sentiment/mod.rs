//! Comment sentiment scoring and aggregation
//!
//! Comments are scored with a lexicon polarity scorer (VADER by default),
//! classified with the ±0.05 compound thresholds, and reduced to counts,
//! percentages and top/bottom lists.

pub mod compare;
pub mod ingest;
pub mod report;

use crate::types::Sentiment;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Length shown for a comment in top lists before it is cut
const TOP_COMMENT_CHARS: usize = 150;

/// Polarity components of one text
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarityScores {
    pub neg: f64,
    pub neu: f64,
    pub pos: f64,
    pub compound: f64,
}

/// Anything that can turn text into polarity scores
pub trait PolarityScorer: Send + Sync {
    fn score(&self, text: &str) -> PolarityScores;
}

/// VADER lexicon scorer
#[derive(Debug, Default, Clone, Copy)]
pub struct VaderScorer;

impl PolarityScorer for VaderScorer {
    fn score(&self, text: &str) -> PolarityScores {
        let analyzer = vader_sentiment::SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(text);
        let get = |key: &str| scores.get(key).copied().unwrap_or(0.0);
        PolarityScores {
            neg: get("neg"),
            neu: get("neu"),
            pos: get("pos"),
            compound: get("compound"),
        }
    }
}

/// One comment after scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredComment {
    pub text: String,
    pub scores: PolarityScores,
    pub sentiment: Sentiment,
}

impl ScoredComment {
    pub fn compound(&self) -> f64 {
        self.scores.compound
    }
}

/// Counts and shares for a set of scored comments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentStats {
    pub total: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub neutral_pct: f64,
    pub avg_compound: f64,
}

/// A comment as shown in a top list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopComment {
    pub text: String,
    pub compound: f64,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopComments {
    pub positive: Vec<TopComment>,
    pub negative: Vec<TopComment>,
}

/// Placeholders left behind by moderated or deleted comments
pub fn is_scorable(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed != "[deleted]" && trimmed != "[removed]"
}

/// Cut `text` to `max` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Score every scorable comment, dropping empties and deleted placeholders
pub fn analyze_comments<S: AsRef<str>>(comments: &[S], scorer: &dyn PolarityScorer) -> Vec<ScoredComment> {
    comments
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| is_scorable(c))
        .map(|c| {
            let scores = scorer.score(c);
            ScoredComment {
                text: c.to_string(),
                scores,
                sentiment: Sentiment::from_compound(scores.compound),
            }
        })
        .collect()
}

/// Counts, percentages (1 decimal) and mean compound (3 decimals)
pub fn calculate_stats(comments: &[ScoredComment]) -> SentimentStats {
    let total = comments.len();
    if total == 0 {
        return SentimentStats::default();
    }

    let count = |s: Sentiment| comments.iter().filter(|c| c.sentiment == s).count();
    let positive = count(Sentiment::Positive);
    let negative = count(Sentiment::Negative);
    let neutral = count(Sentiment::Neutral);
    let pct = |n: usize| round_to(n as f64 / total as f64 * 100.0, 1);
    let avg_compound = comments.iter().map(|c| c.compound()).sum::<f64>() / total as f64;

    SentimentStats {
        total,
        positive,
        negative,
        neutral,
        positive_pct: pct(positive),
        negative_pct: pct(negative),
        neutral_pct: pct(neutral),
        avg_compound: round_to(avg_compound, 3),
    }
}

fn by_compound_desc(a: &ScoredComment, b: &ScoredComment) -> Ordering {
    b.compound().partial_cmp(&a.compound()).unwrap_or(Ordering::Equal)
}

/// The `n` most positive comments and the `n` most negative (most negative first)
pub fn get_top_comments(comments: &[ScoredComment], n: usize) -> TopComments {
    let mut sorted: Vec<&ScoredComment> = comments.iter().collect();
    sorted.sort_by(|a, b| by_compound_desc(a, b));

    let view = |c: &&ScoredComment| TopComment {
        text: truncate_chars(&c.text, TOP_COMMENT_CHARS),
        compound: c.compound(),
        sentiment: c.sentiment,
    };

    let positive = sorted.iter().take(n).map(view).collect();
    let negative = sorted.iter().rev().take(n).map(view).collect();

    TopComments { positive, negative }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scorer with fixed answers, everything else neutral
    pub(crate) struct StubScorer(pub HashMap<String, f64>);

    impl StubScorer {
        pub(crate) fn new(pairs: &[(&str, f64)]) -> Self {
            Self(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        }
    }

    impl PolarityScorer for StubScorer {
        fn score(&self, text: &str) -> PolarityScores {
            let compound = self.0.get(text).copied().unwrap_or(0.0);
            PolarityScores {
                neg: if compound < 0.0 { -compound } else { 0.0 },
                pos: if compound > 0.0 { compound } else { 0.0 },
                neu: 1.0 - compound.abs(),
                compound,
            }
        }
    }

    #[test]
    fn test_filters_empty_and_deleted() {
        let comments = ["I loved it", "", "[deleted]", "terrible movie"];
        let scored = analyze_comments(&comments, &VaderScorer);
        assert_eq!(scored.len(), 2);

        let stats = calculate_stats(&scored);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.positive, 1);
        assert_eq!(stats.negative, 1);
        assert_eq!(stats.neutral, 0);
    }

    #[test]
    fn test_empty_list_zero_stats() {
        let stats = calculate_stats(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.positive, 0);
        assert_eq!(stats.negative, 0);
        assert_eq!(stats.neutral, 0);
        assert_eq!(stats.avg_compound, 0.0);
    }

    #[test]
    fn test_counts_and_percentages_sum() {
        let scorer = StubScorer::new(&[("a", 0.9), ("b", -0.4), ("c", 0.01), ("d", 0.3), ("e", -0.8), ("f", 0.0), ("g", 0.5)]);
        let scored = analyze_comments(&["a", "b", "c", "d", "e", "f", "g", "[removed]"], &scorer);
        let stats = calculate_stats(&scored);

        assert_eq!(stats.positive + stats.negative + stats.neutral, stats.total);
        let pct_sum = stats.positive_pct + stats.negative_pct + stats.neutral_pct;
        assert!((pct_sum - 100.0).abs() <= 0.2, "pct sum {}", pct_sum);
        assert_eq!(stats.positive_pct, 42.9);
        assert_eq!(stats.avg_compound, 0.073);
    }

    #[test]
    fn test_top_comments_order() {
        let scorer = StubScorer::new(&[("good", 0.6), ("great", 0.9), ("bad", -0.5), ("awful", -0.9), ("meh", 0.0)]);
        let scored = analyze_comments(&["good", "great", "bad", "awful", "meh"], &scorer);
        let top = get_top_comments(&scored, 2);

        let pos: Vec<_> = top.positive.iter().map(|c| c.text.as_str()).collect();
        let neg: Vec<_> = top.negative.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(pos, vec!["great", "good"]);
        assert_eq!(neg, vec!["awful", "bad"]);
    }

    #[test]
    fn test_top_comments_truncated() {
        let long = "x".repeat(200);
        let scorer = StubScorer::new(&[(long.as_str(), 0.7)]);
        let scored = analyze_comments(&[long.clone()], &scorer);
        let top = get_top_comments(&scored, 5);
        assert_eq!(top.positive[0].text.chars().count(), 153);
        assert!(top.positive[0].text.ends_with("..."));
        // The stored comment keeps its full text
        assert_eq!(scored[0].text, long);
    }
}
