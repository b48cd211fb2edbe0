//! Loading scraped comment exports from disk
//!
//! Two shapes are accepted:
//! - YouTube: `{query, fetchedAt, totalComments, videoCount, commentsByVideo: {title: [text]}}`
//! - Reddit: either the YouTube shape or `{posts: {title: {comments: [..]}}}` /
//!   `{posts: [{title, comments: [..]}]}`

use super::{analyze_comments, PolarityScorer, ScoredComment};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Where a comment export was scraped from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentSource {
    Youtube,
    Reddit,
}

impl fmt::Display for CommentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentSource::Youtube => write!(f, "youtube"),
            CommentSource::Reddit => write!(f, "reddit"),
        }
    }
}

/// A YouTube comment export
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentExport {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub fetched_at: Option<String>,
    #[serde(default)]
    pub total_comments: Option<u64>,
    #[serde(default)]
    pub video_count: Option<u64>,
    #[serde(default)]
    pub comments_by_video: BTreeMap<String, Vec<Value>>,
}

impl CommentExport {
    /// String comments per video; non-string entries are skipped
    pub fn videos(&self) -> impl Iterator<Item = (&String, Vec<&str>)> {
        self.comments_by_video
            .iter()
            .map(|(title, comments)| (title, comments.iter().filter_map(Value::as_str).collect()))
    }
}

pub fn load_export(path: &Path) -> Result<CommentExport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn string_items(value: &Value) -> impl Iterator<Item = String> + '_ {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
}

/// Flatten every comment string out of either export shape
pub fn extract_comments(data: &Value) -> Vec<String> {
    let mut comments = Vec::new();

    if let Some(by_video) = data.get("commentsByVideo").and_then(Value::as_object) {
        for list in by_video.values() {
            comments.extend(string_items(list));
        }
        return comments;
    }

    match data.get("posts") {
        Some(Value::Object(posts)) => {
            for post in posts.values() {
                if let Some(list) = post.get("comments") {
                    comments.extend(string_items(list));
                }
            }
        }
        Some(Value::Array(posts)) => {
            for post in posts {
                if let Some(list) = post.get("comments") {
                    comments.extend(string_items(list));
                }
            }
        }
        _ => {}
    }

    comments
}

static YOUTUBE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^comments_([A-Za-z0-9]+)_\d{4}").expect("valid regex"));

static REDDIT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^reddit_(.+?)_\d{4}").expect("valid regex"));

fn split_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = ch.is_ascii_lowercase();
        out.push(ch);
    }
    out
}

/// Raw movie name encoded in an export's file name
pub fn extract_movie_name(filename: &str, source: CommentSource) -> String {
    match source {
        CommentSource::Youtube => match YOUTUBE_NAME_RE.captures(filename) {
            Some(caps) => split_camel_case(&caps[1]),
            // Dated exports without a name predate the multi-movie scrape
            None => "One Battle After Another".to_string(),
        },
        CommentSource::Reddit => match REDDIT_NAME_RE.captures(filename) {
            Some(caps) => {
                let name = caps[1].replace('_', " ");
                let trimmed = name.trim_end();
                match trimmed.to_lowercase().strip_suffix(" movie") {
                    Some(rest) => trimmed[..rest.len()].trim_end().to_string(),
                    None => trimmed.to_string(),
                }
            }
            None => "Unknown".to_string(),
        },
    }
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical movie name so YouTube and Reddit exports line up
pub fn normalize_movie_name(name: &str) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

    if name.contains("one battle") || name.contains("obaa") {
        return "One Battle After Another".to_string();
    }
    if name.contains("marty") {
        return "Marty Supreme".to_string();
    }
    if name.contains("sinner") {
        return "Sinners".to_string();
    }
    if name.contains("f1") || name == "f 1" {
        return "F1".to_string();
    }
    title_case(&name)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Score every export in `dir`, grouped by normalized movie name.
/// A missing directory yields no movies.
pub fn load_source_dir(
    dir: &Path,
    source: CommentSource,
    scorer: &dyn PolarityScorer,
) -> Result<BTreeMap<String, Vec<ScoredComment>>> {
    let mut results: BTreeMap<String, Vec<ScoredComment>> = BTreeMap::new();

    if !dir.exists() {
        warn!("[Sentiment] {} directory {} not found", source, dir.display());
        return Ok(results);
    }

    for path in json_files(dir)? {
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let movie = normalize_movie_name(&extract_movie_name(filename, source));

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let data: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("[Sentiment] Skipping malformed {}: {}", path.display(), e);
                continue;
            }
        };

        let comments = extract_comments(&data);
        let scored = analyze_comments(&comments, scorer);
        debug!("[Sentiment] {} -> {} ({} scored)", filename, movie, scored.len());
        results.entry(movie).or_default().extend(scored);
    }

    info!("[Sentiment] {}: {} movies", source, results.len());
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::tests::StubScorer;
    use serde_json::json;

    #[test]
    fn test_extract_comments_by_video() {
        let data = json!({
            "query": "Sinners movie trailer",
            "commentsByVideo": {"Trailer 1": ["a", "b", 3], "Trailer 2": ["c"]}
        });
        assert_eq!(extract_comments(&data), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_extract_comments_posts_shapes() {
        let as_map = json!({"posts": {"Discussion": {"comments": ["x", "y"]}, "Bad": "nope"}});
        assert_eq!(extract_comments(&as_map), vec!["x", "y"]);

        let as_list = json!({"posts": [{"title": "T", "comments": ["z"]}, {"title": "empty"}]});
        assert_eq!(extract_comments(&as_list), vec!["z"]);

        assert!(extract_comments(&json!({"other": 1})).is_empty());
    }

    #[test]
    fn test_extract_movie_name() {
        assert_eq!(
            extract_movie_name("comments_OneBattleAfterAnother_2025-10-01.json", CommentSource::Youtube),
            "One Battle After Another"
        );
        assert_eq!(
            extract_movie_name("comments_2025-10-01.json", CommentSource::Youtube),
            "One Battle After Another"
        );
        assert_eq!(
            extract_movie_name("reddit_Marty_Supreme_movie_2025-12-01.json", CommentSource::Reddit),
            "Marty Supreme"
        );
        assert_eq!(extract_movie_name("notes.json", CommentSource::Reddit), "Unknown");
    }

    #[test]
    fn test_normalize_movie_name() {
        assert_eq!(normalize_movie_name("OBAA"), "One Battle After Another");
        assert_eq!(normalize_movie_name("  the   sinners "), "Sinners");
        assert_eq!(normalize_movie_name("F1"), "F1");
        assert_eq!(normalize_movie_name("hamnet  film"), "Hamnet Film");
    }

    #[test]
    fn test_load_source_dir_groups_by_movie() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("reddit_Sinners_2025-11-02.json"),
            json!({"posts": [{"comments": ["great", "[deleted]"]}]}).to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("reddit_sinners_movie_2025-11-09.json"),
            json!({"posts": {"Thread": {"comments": ["bad"]}}}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("reddit_broken_2025-11-09.json"), "{not json").unwrap();

        let scorer = StubScorer::new(&[("great", 0.8), ("bad", -0.6)]);
        let results = load_source_dir(dir.path(), CommentSource::Reddit, &scorer).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["Sinners"].len(), 2);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let results = load_source_dir(Path::new("/nonexistent/dir"), CommentSource::Youtube, &StubScorer::new(&[])).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_load_export_videos() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comments_Sinners_2025-10-01.json");
        std::fs::write(
            &path,
            json!({
                "query": "Sinners movie trailer",
                "fetchedAt": "2025-10-01T00:00:00Z",
                "totalComments": 2,
                "videoCount": 1,
                "commentsByVideo": {"Official Trailer": ["wow", null]}
            })
            .to_string(),
        )
        .unwrap();
        let export = load_export(&path).unwrap();
        assert_eq!(export.query, "Sinners movie trailer");
        let videos: Vec<_> = export.videos().collect();
        assert_eq!(videos[0].1, vec!["wow"]);
    }
}
