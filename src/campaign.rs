//! Campaign fit scoring on top of sentiment
//!
//! Each comment is flagged for keyword groups (watch intent, craft, music,
//! performance, family, confusion, toxicity). Flags and sentiment are averaged
//! per movie and combined into one score per campaign angle.

use crate::sentiment::ingest::{CommentExport, CommentSource};
use crate::sentiment::{is_scorable, round_to, PolarityScorer};
use crate::types::Sentiment;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Keyword groups checked against normalized comment text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordGroup {
    IntentWatch,
    Craft,
    Music,
    Performance,
    Family,
    Confusion,
    Toxicity,
}

impl KeywordGroup {
    pub const ALL: [KeywordGroup; 7] = [
        KeywordGroup::IntentWatch,
        KeywordGroup::Craft,
        KeywordGroup::Music,
        KeywordGroup::Performance,
        KeywordGroup::Family,
        KeywordGroup::Confusion,
        KeywordGroup::Toxicity,
    ];

    pub fn phrases(&self) -> &'static [&'static str] {
        match self {
            KeywordGroup::IntentWatch => &[
                "i'm in", "im in", "i am in", "must watch", "need to watch", "can't wait", "cant wait",
                "so hyped", "hyped", "i will watch", "going to watch", "see it", "watch this",
                "opening night", "buy tickets", "ticket", "cinema", "theater", "theatre", "imax", "70mm",
            ],
            KeywordGroup::Craft => &[
                "cinematography", "shot", "shots", "camera", "lens", "lighting", "framing", "composition",
                "vfx", "visuals", "color grading", "sound design", "mix", "editing", "cut", "montage",
                "production design", "set design", "vistas", "format", "film", "35mm", "70mm", "imax", "vistavision",
            ],
            KeywordGroup::Music => &[
                "score", "soundtrack", "music", "theme", "jonny greenwood", "greenwood", "composition",
                "orchestra", "strings", "sound",
            ],
            KeywordGroup::Performance => &[
                "acting", "performance", "cast", "actor", "actress",
                "dicaprio", "leonardo", "leo", "sean penn", "penn",
                "teyana", "taylor", "benicio", "del toro",
            ],
            KeywordGroup::Family => &[
                "father", "dad", "daughter", "family", "parent", "kid", "child", "protect", "relationship",
                "emotional", "heart", "cry", "tears", "made me cry",
            ],
            KeywordGroup::Confusion => &[
                "confusing", "what is this", "i don't get it", "dont get it", "don't get it", "no idea",
                "makes no sense", "lost", "weird", "wtf", "huh", "hard to follow", "complicated",
            ],
            KeywordGroup::Toxicity => &[
                "trash", "garbage", "woke", "propaganda", "boycott", "stupid", "idiot", "hate", "ruined",
                "worst", "cringe",
            ],
        }
    }
}

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s']+").expect("valid regex"));

/// Lowercase, replace punctuation with spaces, collapse whitespace
pub fn normalize_text(text: &str) -> String {
    let lower = text.to_lowercase();
    let spaced = NON_WORD_RE.replace_all(&lower, " ");
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Groups whose phrases occur (as substrings) in the normalized text
pub fn keyword_flags(text: &str) -> BTreeMap<KeywordGroup, bool> {
    let normalized = normalize_text(text);
    KeywordGroup::ALL
        .iter()
        .map(|group| (*group, group.phrases().iter().any(|p| normalized.contains(p))))
        .collect()
}

/// One comment scored for campaign analysis
#[derive(Debug, Clone)]
pub struct CampaignComment {
    pub movie: String,
    pub video_title: String,
    pub source: CommentSource,
    pub text: String,
    pub compound: f64,
    pub sentiment: Sentiment,
    pub flags: BTreeMap<KeywordGroup, bool>,
}

/// Turn an export into scored rows keyed by its query
pub fn score_export(export: &CommentExport, source: CommentSource, scorer: &dyn PolarityScorer) -> Vec<CampaignComment> {
    let movie = if export.query.is_empty() { "UNKNOWN_MOVIE".to_string() } else { export.query.clone() };

    export
        .videos()
        .flat_map(|(title, texts)| {
            let movie = movie.clone();
            texts.into_iter().filter(|t| is_scorable(t)).map(move |text| {
                let compound = scorer.score(text).compound;
                CampaignComment {
                    movie: movie.clone(),
                    video_title: title.clone(),
                    source,
                    text: text.to_string(),
                    compound,
                    sentiment: Sentiment::from_compound(compound),
                    flags: keyword_flags(text),
                }
            })
        })
        .collect()
}

/// Aggregates for one grouping; rates are percentages with 2 decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    pub movie: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_title: Option<String>,
    pub source: CommentSource,
    pub n: usize,
    pub avg_compound: f64,
    pub pos_rate: f64,
    pub neg_rate: f64,
    pub neu_rate: f64,
    pub intent_rate: f64,
    pub craft_rate: f64,
    pub music_rate: f64,
    pub perf_rate: f64,
    pub family_rate: f64,
    pub confusion_rate: f64,
    pub toxicity_rate: f64,
}

/// Grouping level for [`aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// movie + source
    Movie,
    /// movie + video + source
    Video,
}

fn metrics_for(rows: &[&CampaignComment], movie: &str, video: Option<&str>, source: CommentSource) -> GroupMetrics {
    let n = rows.len();
    let rate = |pred: &dyn Fn(&CampaignComment) -> bool| {
        round_to(rows.iter().filter(|r| pred(**r)).count() as f64 / n as f64 * 100.0, 2)
    };
    let flag = |group: KeywordGroup| rate(&|r: &CampaignComment| r.flags.get(&group).copied().unwrap_or(false));

    GroupMetrics {
        movie: movie.to_string(),
        video_title: video.map(str::to_string),
        source,
        n,
        avg_compound: round_to(rows.iter().map(|r| r.compound).sum::<f64>() / n as f64, 3),
        pos_rate: rate(&|r: &CampaignComment| r.sentiment == Sentiment::Positive),
        neg_rate: rate(&|r: &CampaignComment| r.sentiment == Sentiment::Negative),
        neu_rate: rate(&|r: &CampaignComment| r.sentiment == Sentiment::Neutral),
        intent_rate: flag(KeywordGroup::IntentWatch),
        craft_rate: flag(KeywordGroup::Craft),
        music_rate: flag(KeywordGroup::Music),
        perf_rate: flag(KeywordGroup::Performance),
        family_rate: flag(KeywordGroup::Family),
        confusion_rate: flag(KeywordGroup::Confusion),
        toxicity_rate: flag(KeywordGroup::Toxicity),
    }
}

/// Group rows and compute rates; groups are ordered by their key
pub fn aggregate(rows: &[CampaignComment], level: Level) -> Vec<GroupMetrics> {
    let mut groups: BTreeMap<(String, Option<String>, CommentSource), Vec<&CampaignComment>> = BTreeMap::new();
    for row in rows {
        let video = match level {
            Level::Video => Some(row.video_title.clone()),
            Level::Movie => None,
        };
        groups.entry((row.movie.clone(), video, row.source)).or_default().push(row);
    }

    groups
        .iter()
        .map(|((movie, video, source), members)| metrics_for(members, movie, video.as_deref(), *source))
        .collect()
}

/// Weights for the four signal campaigns
#[derive(Debug, Clone, Copy)]
pub struct CampaignWeights {
    pub sentiment: f64,
    pub intent: f64,
    pub signal: f64,
    /// Subtracted against the mean of confusion and toxicity
    pub friction: f64,
}

impl Default for CampaignWeights {
    fn default() -> Self {
        Self {
            sentiment: 0.35,
            intent: 0.25,
            signal: 0.25,
            friction: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignScores {
    pub movie: String,
    pub source: CommentSource,
    pub n: usize,
    pub avg_compound: f64,
    pub pos_rate: f64,
    pub neg_rate: f64,
    pub intent_rate: f64,
    pub family_rate: f64,
    pub craft_rate: f64,
    pub music_rate: f64,
    pub perf_rate: f64,
    pub confusion_rate: f64,
    pub toxicity_rate: f64,
    pub score_heart_family: f64,
    pub score_craft_event: f64,
    pub score_music_listening: f64,
    pub score_performance_spotlight: f64,
    pub score_reduce_confusion: f64,
    pub best_campaign: String,
    pub best_score: f64,
}

fn unit(rate_pct: f64) -> f64 {
    (rate_pct / 100.0).clamp(0.0, 1.0)
}

/// Score each movie-level row, sorted by source then craft score (desc)
pub fn prioritize(movie_metrics: &[GroupMetrics], weights: CampaignWeights) -> Vec<CampaignScores> {
    let mut scored: Vec<CampaignScores> = movie_metrics
        .iter()
        .map(|m| {
            let sent = (m.avg_compound + 1.0) / 2.0;
            let intent = unit(m.intent_rate);
            let confusion = unit(m.confusion_rate);
            let toxicity = unit(m.toxicity_rate);
            let friction = (confusion + toxicity) / 2.0;

            let score = |signal: f64| {
                round_to(
                    (weights.sentiment * sent + weights.intent * intent + weights.signal * signal
                        - weights.friction * friction)
                        * 100.0,
                    2,
                )
            };

            let heart = score(unit(m.family_rate));
            let craft = score(unit(m.craft_rate));
            let music = score(unit(m.music_rate));
            let perf = score(unit(m.perf_rate));
            let reduce = round_to((0.45 * sent + 0.25 * intent + 0.30 * confusion - 0.10 * toxicity) * 100.0, 2);

            let candidates = [
                ("score_heart_family", heart),
                ("score_craft_event", craft),
                ("score_music_listening", music),
                ("score_performance_spotlight", perf),
                ("score_reduce_confusion", reduce),
            ];
            // First maximum wins ties
            let (best_campaign, best_score) = candidates
                .iter()
                .fold(candidates[0], |best, c| if c.1 > best.1 { *c } else { best });

            CampaignScores {
                movie: m.movie.clone(),
                source: m.source,
                n: m.n,
                avg_compound: m.avg_compound,
                pos_rate: m.pos_rate,
                neg_rate: m.neg_rate,
                intent_rate: m.intent_rate,
                family_rate: m.family_rate,
                craft_rate: m.craft_rate,
                music_rate: m.music_rate,
                perf_rate: m.perf_rate,
                confusion_rate: m.confusion_rate,
                toxicity_rate: m.toxicity_rate,
                score_heart_family: heart,
                score_craft_event: craft,
                score_music_listening: music,
                score_performance_spotlight: perf,
                score_reduce_confusion: reduce,
                best_campaign: best_campaign.to_string(),
                best_score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        a.source
            .to_string()
            .cmp(&b.source.to_string())
            .then(b.score_craft_event.total_cmp(&a.score_craft_event))
    });
    scored
}

/// Metrics compared between the focus movie and the rest of its source
pub const FOCUS_METRICS: [&str; 13] = [
    "avg_compound",
    "pos_rate",
    "neg_rate",
    "intent_rate",
    "perf_rate",
    "craft_rate",
    "family_rate",
    "music_rate",
    "confusion_rate",
    "toxicity_rate",
    "score_reduce_confusion",
    "score_performance_spotlight",
    "score_craft_event",
];

impl CampaignScores {
    /// Numeric column by its CSV name
    pub fn metric(&self, key: &str) -> Option<f64> {
        Some(match key {
            "avg_compound" => self.avg_compound,
            "pos_rate" => self.pos_rate,
            "neg_rate" => self.neg_rate,
            "intent_rate" => self.intent_rate,
            "family_rate" => self.family_rate,
            "craft_rate" => self.craft_rate,
            "music_rate" => self.music_rate,
            "perf_rate" => self.perf_rate,
            "confusion_rate" => self.confusion_rate,
            "toxicity_rate" => self.toxicity_rate,
            "score_heart_family" => self.score_heart_family,
            "score_craft_event" => self.score_craft_event,
            "score_music_listening" => self.score_music_listening,
            "score_performance_spotlight" => self.score_performance_spotlight,
            "score_reduce_confusion" => self.score_reduce_confusion,
            _ => return None,
        })
    }
}

/// Position of a movie within its source by intent rate (1 = highest)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentRank {
    pub movie: String,
    pub source: CommentSource,
    pub intent_rate: f64,
    pub intent_rank: usize,
    pub is_focus: bool,
}

/// The focus movie against the other movies of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusSummary {
    pub movie: String,
    pub source: CommentSource,
    pub n: usize,
    pub intent_rank: usize,
    /// Movies in the source, focus included
    pub cohort_n_movies: usize,
    /// `None` when the focus movie is alone in its source
    pub cohort_intent_mean: Option<f64>,
    pub cohort_intent_median: Option<f64>,
    pub values: BTreeMap<String, f64>,
    pub cohort_means: BTreeMap<String, f64>,
    /// Focus value minus cohort mean
    pub deltas: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusReport {
    pub focus_movie: String,
    /// Grouped by source, best rank first
    pub ranks: Vec<IntentRank>,
    pub sources: Vec<FocusSummary>,
}

/// Most-commented movie whose name contains `needle` (case-insensitive),
/// else the first row
pub fn pick_focus_movie(rows: &[CampaignScores], needle: &str) -> Option<String> {
    let needle = needle.to_lowercase();
    rows.iter()
        .filter(|r| r.movie.to_lowercase().contains(&needle))
        .fold(None, |best: Option<&CampaignScores>, r| match best {
            Some(b) if b.n >= r.n => Some(b),
            _ => Some(r),
        })
        .or_else(|| rows.first())
        .map(|r| r.movie.clone())
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Intent ranks per source plus deltas of the focus movie against its cohort
pub fn focus_report(rows: &[CampaignScores], needle: &str) -> Option<FocusReport> {
    let focus_movie = pick_focus_movie(rows, needle)?;
    let is_focus = |movie: &str| movie.eq_ignore_ascii_case(&focus_movie);

    let mut by_source: BTreeMap<String, Vec<&CampaignScores>> = BTreeMap::new();
    for row in rows {
        by_source.entry(row.source.to_string()).or_default().push(row);
    }

    let mut ranks = Vec::with_capacity(rows.len());
    let mut sources = Vec::new();

    for group in by_source.values_mut() {
        group.sort_by(|a, b| b.intent_rate.total_cmp(&a.intent_rate));
        ranks.extend(group.iter().enumerate().map(|(i, r)| IntentRank {
            movie: r.movie.clone(),
            source: r.source,
            intent_rate: r.intent_rate,
            intent_rank: i + 1,
            is_focus: is_focus(r.movie.as_str()),
        }));

        let Some((rank, focus)) = group.iter().enumerate().find(|(_, r)| is_focus(r.movie.as_str())) else {
            continue;
        };
        let others: Vec<&&CampaignScores> = group.iter().filter(|r| !is_focus(r.movie.as_str())).collect();
        let column = |key: &str| -> Vec<f64> { others.iter().filter_map(|r| r.metric(key)).collect() };

        let mut values = BTreeMap::new();
        let mut cohort_means = BTreeMap::new();
        let mut deltas = BTreeMap::new();
        for key in FOCUS_METRICS {
            let value = focus.metric(key).unwrap_or_default();
            values.insert(key.to_string(), value);
            if let Some(m) = mean(&column(key)) {
                cohort_means.insert(key.to_string(), round_to(m, 3));
                deltas.insert(key.to_string(), round_to(value - m, 3));
            }
        }

        let intents = column("intent_rate");
        sources.push(FocusSummary {
            movie: focus.movie.clone(),
            source: focus.source,
            n: focus.n,
            intent_rank: rank + 1,
            cohort_n_movies: group.len(),
            cohort_intent_mean: mean(&intents).map(|m| round_to(m, 3)),
            cohort_intent_median: median(&intents).map(|m| round_to(m, 3)),
            values,
            cohort_means,
            deltas,
        });
    }

    Some(FocusReport {
        focus_movie,
        ranks,
        sources,
    })
}

pub fn write_focus_report(report: &FocusReport, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join("focus_report.json");
    std::fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Everything one campaign run produces
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub video_metrics: Vec<GroupMetrics>,
    pub movie_metrics: Vec<GroupMetrics>,
    pub prioritization: Vec<CampaignScores>,
}

/// Load `comments_*.json` (YouTube) and `reddit_*.json` (Reddit) exports and score them
pub fn run_campaign_analysis(
    youtube_dir: &Path,
    reddit_dir: Option<&Path>,
    scorer: &dyn PolarityScorer,
) -> Result<CampaignReport> {
    let mut rows = load_rows(youtube_dir, "comments_", CommentSource::Youtube, scorer)?;
    if let Some(dir) = reddit_dir {
        rows.extend(load_rows(dir, "reddit_", CommentSource::Reddit, scorer)?);
    }

    if rows.is_empty() {
        anyhow::bail!("No comments loaded from {}", youtube_dir.display());
    }

    let movie_metrics = aggregate(&rows, Level::Movie);
    Ok(CampaignReport {
        video_metrics: aggregate(&rows, Level::Video),
        prioritization: prioritize(&movie_metrics, CampaignWeights::default()),
        movie_metrics,
    })
}

fn load_rows(dir: &Path, prefix: &str, source: CommentSource, scorer: &dyn PolarityScorer) -> Result<Vec<CampaignComment>> {
    let mut rows = Vec::new();
    if !dir.exists() {
        tracing::warn!("[Campaign] {} not found", dir.display());
        return Ok(rows);
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            name.starts_with(prefix) && name.ends_with(".json")
        })
        .collect();
    paths.sort();

    for path in paths {
        tracing::info!("[Campaign] Loading {}", path.display());
        let export = crate::sentiment::ingest::load_export(&path)?;
        rows.extend(score_export(&export, source, scorer));
    }
    Ok(rows)
}

/// Write the metric tables as CSV plus a JSON copy of the whole report
pub fn write_report(report: &CampaignReport, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    write_csv(&out_dir.join("video_metrics.csv"), &report.video_metrics)?;
    write_csv(&out_dir.join("movie_metrics.csv"), &report.movie_metrics)?;
    write_csv(&out_dir.join("campaign_prioritization.csv"), &report.prioritization)?;

    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(out_dir.join("campaign_report.json"), json)?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::tests::StubScorer;

    fn row(movie: &str, text: &str, compound: f64) -> CampaignComment {
        CampaignComment {
            movie: movie.into(),
            video_title: "Trailer".into(),
            source: CommentSource::Youtube,
            text: text.into(),
            compound,
            sentiment: Sentiment::from_compound(compound),
            flags: keyword_flags(text),
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("WTF?! This   is... KINO"), "wtf this is kino");
        assert_eq!(normalize_text("I'm in!!"), "i'm in");
    }

    #[test]
    fn test_keyword_flags() {
        let flags = keyword_flags("The score by Jonny Greenwood made me cry");
        assert!(flags[&KeywordGroup::Music]);
        assert!(flags[&KeywordGroup::Family]);
        assert!(!flags[&KeywordGroup::Toxicity]);
    }

    #[test]
    fn test_aggregate_rates() {
        let rows = vec![
            row("OBAA", "buy tickets now", 0.5),
            row("OBAA", "this is trash", -0.6),
            row("OBAA", "ok", 0.0),
            row("OBAA", "huh", 0.0),
        ];
        let metrics = aggregate(&rows, Level::Movie);
        assert_eq!(metrics.len(), 1);
        let m = &metrics[0];
        assert_eq!(m.n, 4);
        assert_eq!(m.pos_rate, 25.0);
        assert_eq!(m.neu_rate, 50.0);
        assert_eq!(m.intent_rate, 25.0);
        assert_eq!(m.toxicity_rate, 25.0);
        assert_eq!(m.confusion_rate, 25.0);
        assert_eq!(m.avg_compound, -0.025);
        assert!(m.video_title.is_none());

        let by_video = aggregate(&rows, Level::Video);
        assert_eq!(by_video[0].video_title.as_deref(), Some("Trailer"));
    }

    #[test]
    fn test_prioritize_formula() {
        let m = GroupMetrics {
            movie: "OBAA".into(),
            video_title: None,
            source: CommentSource::Youtube,
            n: 10,
            avg_compound: 0.2,
            pos_rate: 50.0,
            neg_rate: 20.0,
            neu_rate: 30.0,
            intent_rate: 10.0,
            craft_rate: 40.0,
            music_rate: 0.0,
            perf_rate: 20.0,
            family_rate: 0.0,
            confusion_rate: 10.0,
            toxicity_rate: 30.0,
        };
        let scores = prioritize(&[m], CampaignWeights::default());
        let s = &scores[0];
        // sent=0.6, intent=0.1, friction=0.2
        assert_eq!(s.score_craft_event, 30.5);
        assert_eq!(s.score_heart_family, 20.5);
        assert_eq!(s.score_performance_spotlight, 25.5);
        assert_eq!(s.score_reduce_confusion, 29.5);
        assert_eq!(s.best_campaign, "score_craft_event");
        assert_eq!(s.best_score, 30.5);
    }

    fn scores(movie: &str, source: CommentSource, n: usize, intent: f64, compound: f64) -> CampaignScores {
        let metrics = GroupMetrics {
            movie: movie.into(),
            video_title: None,
            source,
            n,
            avg_compound: compound,
            pos_rate: 50.0,
            neg_rate: 10.0,
            neu_rate: 40.0,
            intent_rate: intent,
            craft_rate: 20.0,
            music_rate: 0.0,
            perf_rate: 10.0,
            family_rate: 0.0,
            confusion_rate: 0.0,
            toxicity_rate: 0.0,
        };
        prioritize(&[metrics], CampaignWeights::default()).remove(0)
    }

    #[test]
    fn test_pick_focus_movie() {
        let rows = vec![
            scores("Sinners", CommentSource::Youtube, 50, 5.0, 0.1),
            scores("One Battle After Another teaser", CommentSource::Youtube, 10, 5.0, 0.1),
            scores("One Battle After Another trailer", CommentSource::Youtube, 40, 5.0, 0.1),
        ];
        assert_eq!(
            pick_focus_movie(&rows, "one battle after another").as_deref(),
            Some("One Battle After Another trailer")
        );
        assert_eq!(pick_focus_movie(&rows, "Hamnet").as_deref(), Some("Sinners"));
        assert!(pick_focus_movie(&[], "x").is_none());
    }

    #[test]
    fn test_focus_ranks_and_deltas() {
        let rows = vec![
            scores("OBAA", CommentSource::Youtube, 30, 10.0, 0.3),
            scores("Sinners", CommentSource::Youtube, 30, 20.0, 0.1),
            scores("Hamnet", CommentSource::Youtube, 30, 4.0, 0.2),
            scores("OBAA", CommentSource::Reddit, 5, 1.0, 0.0),
        ];
        let report = focus_report(&rows, "obaa").unwrap();
        assert_eq!(report.focus_movie, "OBAA");

        let youtube: Vec<(&str, usize)> = report
            .ranks
            .iter()
            .filter(|r| r.source == CommentSource::Youtube)
            .map(|r| (r.movie.as_str(), r.intent_rank))
            .collect();
        assert_eq!(youtube, vec![("Sinners", 1), ("OBAA", 2), ("Hamnet", 3)]);
        assert!(report.ranks.iter().filter(|r| r.is_focus).count() == 2);

        let yt = report.sources.iter().find(|s| s.source == CommentSource::Youtube).unwrap();
        assert_eq!(yt.intent_rank, 2);
        assert_eq!(yt.cohort_n_movies, 3);
        assert_eq!(yt.cohort_intent_mean, Some(12.0));
        assert_eq!(yt.cohort_intent_median, Some(12.0));
        assert_eq!(yt.deltas["intent_rate"], -2.0);
        assert_eq!(yt.deltas["avg_compound"], 0.15);
        assert_eq!(yt.deltas.len(), FOCUS_METRICS.len());

        // Alone in its source: ranked, but nothing to compare against
        let rd = report.sources.iter().find(|s| s.source == CommentSource::Reddit).unwrap();
        assert_eq!(rd.intent_rank, 1);
        assert_eq!(rd.cohort_intent_mean, None);
        assert!(rd.deltas.is_empty());
        assert_eq!(rd.values["intent_rate"], 1.0);
    }

    #[test]
    fn test_run_and_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let yt = dir.path().join("youtube");
        std::fs::create_dir_all(&yt).unwrap();
        std::fs::write(
            yt.join("comments_Sinners_2025-10-01.json"),
            serde_json::json!({
                "query": "Sinners movie trailer",
                "commentsByVideo": {"T1": ["cant wait", "cringe"], "T2": ["the cinematography"]}
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(yt.join("ignored.json"), "{}").unwrap();

        let scorer = StubScorer::new(&[("cant wait", 0.4), ("cringe", -0.3)]);
        let report = run_campaign_analysis(&yt, None, &scorer).unwrap();
        assert_eq!(report.movie_metrics.len(), 1);
        assert_eq!(report.video_metrics.len(), 2);
        assert_eq!(report.prioritization[0].movie, "Sinners movie trailer");

        let out = dir.path().join("out");
        write_report(&report, &out).unwrap();
        assert!(out.join("campaign_prioritization.csv").exists());
        assert!(out.join("campaign_report.json").exists());
    }

    #[test]
    fn test_run_with_no_comments_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_campaign_analysis(dir.path(), None, &StubScorer::new(&[])).is_err());
    }
}
