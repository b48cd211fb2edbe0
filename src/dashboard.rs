//! Static HTML dashboards
//!
//! Each page is self-contained: the data travels as JSON inside a
//! `<script type="application/json">` block and a plain table summarizes it.

use crate::campaign::{CampaignScores, FocusReport};
use crate::markets::Comparison;
use crate::sentiment::report::SentimentDashboard;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;
use tracing::info;

/// Id of the embedded JSON block
pub const DATA_ELEMENT_ID: &str = "dashboard-data";

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;background:#111;color:#eee}\
table{border-collapse:collapse;width:100%}\
th,td{padding:.4rem .8rem;border-bottom:1px solid #333;text-align:left}\
th{color:#d4af37}.num{text-align:right}.focus{background:#2a2410}\
.up{color:#6c6}.down{color:#e66}";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON safe to place inside a script element
pub fn embed_json<T: Serialize>(payload: &T) -> Result<String> {
    let json = serde_json::to_string(payload).context("Failed to serialize dashboard payload")?;
    Ok(json.replace("</", "<\\/"))
}

fn page(title: &str, payload_json: &str, table: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         <style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{table}\n\
         <script type=\"application/json\" id=\"{DATA_ELEMENT_ID}\">{payload_json}</script>\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn fmt_odds(odds: Option<i64>) -> String {
    odds.map(|o| format!("{}¢", o)).unwrap_or_else(|| "-".into())
}

pub fn sentiment_page(dashboard: &SentimentDashboard) -> Result<String> {
    let mut table = String::from(
        "<table>\n<tr><th>Movie</th><th class=\"num\">Comments</th><th class=\"num\">Positive %</th>\
         <th class=\"num\">Negative %</th><th class=\"num\">Avg compound</th></tr>\n",
    );
    for movie in &dashboard.movies {
        let s = &movie.combined.stats;
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{:.1}</td><td class=\"num\">{:.1}</td><td class=\"num\">{:.3}</td></tr>",
            escape_html(&movie.name),
            s.total,
            s.positive_pct,
            s.negative_pct,
            s.avg_compound
        );
    }
    table.push_str("</table>");

    let rankings = &dashboard.comparison.rankings;
    table.push_str("\n<h2>Rankings</h2>\n<table>\n<tr><th>#</th><th>Positivity</th><th>Avg compound</th><th>Engagement</th></tr>\n");
    for (i, ((pos, avg), eng)) in rankings
        .by_positivity
        .iter()
        .zip(&rankings.by_avg_compound)
        .zip(&rankings.by_engagement)
        .enumerate()
    {
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            i + 1,
            escape_html(pos),
            escape_html(avg),
            escape_html(eng)
        );
    }
    table.push_str("</table>");

    Ok(page("Oscar Sentiment Dashboard", &embed_json(dashboard)?, &table))
}

pub fn comparison_page(comparison: &Comparison) -> Result<String> {
    let mut table = String::from(
        "<table>\n<tr><th>Movie</th><th class=\"num\">Markets</th><th class=\"num\">Best Picture</th>\
         <th class=\"num\">Director</th><th class=\"num\">Avg yes</th><th class=\"num\">Volume</th></tr>\n",
    );
    for movie in &comparison.movies {
        let _ = writeln!(
            table,
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{:.1}</td><td class=\"num\">{}</td></tr>",
            escape_html(&movie.name),
            movie.metrics.total_markets,
            fmt_odds(movie.best_picture_odds),
            fmt_odds(movie.best_director_odds),
            movie.metrics.avg_yes_price,
            movie.metrics.total_volume
        );
    }
    table.push_str("</table>");

    Ok(page("Oscar Prediction Markets", &embed_json(comparison)?, &table))
}

#[derive(Serialize)]
struct CampaignPayload<'a> {
    prioritization: &'a [CampaignScores],
    focus: Option<&'a FocusReport>,
}

fn fmt_delta(delta: Option<&f64>) -> String {
    match delta {
        Some(d) if *d > 0.0 => format!("<span class=\"up\">+{:.3}</span>", d),
        Some(d) if *d < 0.0 => format!("<span class=\"down\">{:.3}</span>", d),
        Some(d) => format!("{:.3}", d),
        None => "-".to_string(),
    }
}

/// Campaign prioritization with intent ranks; the focus movie's rows are
/// highlighted and compared against the other movies of each source
pub fn campaign_page(prioritization: &[CampaignScores], focus: Option<&FocusReport>) -> Result<String> {
    let rank_of = |movie: &str, source: &str| {
        focus
            .and_then(|f| f.ranks.iter().find(|r| r.movie == movie && r.source.to_string() == source))
            .map(|r| r.intent_rank.to_string())
            .unwrap_or_else(|| "-".into())
    };

    let mut table = String::from(
        "<table>\n<tr><th>Movie</th><th>Source</th><th class=\"num\">Comments</th><th class=\"num\">Intent %</th>\
         <th class=\"num\">Intent rank</th><th class=\"num\">Avg compound</th><th>Best campaign</th><th class=\"num\">Score</th></tr>\n",
    );
    for row in prioritization {
        let source = row.source.to_string();
        let highlight = focus.is_some_and(|f| f.focus_movie.eq_ignore_ascii_case(&row.movie));
        let _ = writeln!(
            table,
            "<tr{}><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{:.2}</td><td class=\"num\">{}</td>\
             <td class=\"num\">{:.3}</td><td>{}</td><td class=\"num\">{:.2}</td></tr>",
            if highlight { " class=\"focus\"" } else { "" },
            escape_html(&row.movie),
            source,
            row.n,
            row.intent_rate,
            rank_of(&row.movie, &source),
            row.avg_compound,
            escape_html(&row.best_campaign),
            row.best_score
        );
    }
    table.push_str("</table>");

    let title = match focus {
        Some(f) => {
            let _ = write!(table, "\n<h2>{} vs cohort</h2>\n", escape_html(&f.focus_movie));
            for summary in &f.sources {
                let _ = writeln!(
                    table,
                    "<h3>{} - intent rank {} of {}</h3>\n<table>\n<tr><th>Metric</th><th class=\"num\">Value</th>\
                     <th class=\"num\">Cohort mean</th><th class=\"num\">Delta</th></tr>",
                    summary.source, summary.intent_rank, summary.cohort_n_movies
                );
                for (key, value) in &summary.values {
                    let _ = writeln!(
                        table,
                        "<tr><td>{}</td><td class=\"num\">{:.3}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>",
                        key,
                        value,
                        summary.cohort_means.get(key).map_or("-".to_string(), |m| format!("{:.3}", m)),
                        fmt_delta(summary.deltas.get(key))
                    );
                }
                table.push_str("</table>\n");
            }
            format!("{} Campaign Dashboard", f.focus_movie)
        }
        None => "Campaign Dashboard".to_string(),
    };

    let payload = CampaignPayload { prioritization, focus };
    Ok(page(&title, &embed_json(&payload)?, &table))
}

pub fn write_page(path: &Path, html: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, html).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("[Dashboard] Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::{build_comparison, MarketSnapshot};
    use crate::sentiment::report::build_dashboard;
    use crate::sentiment::{PolarityScores, ScoredComment};
    use crate::types::Sentiment;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn extract_payload(html: &str) -> serde_json::Value {
        let open = format!("id=\"{}\">", DATA_ELEMENT_ID);
        let start = html.find(&open).unwrap() + open.len();
        let end = start + html[start..].find("</script>").unwrap();
        serde_json::from_str(&html[start..end]).unwrap()
    }

    #[test]
    fn test_script_close_is_escaped() {
        let mut youtube = BTreeMap::new();
        youtube.insert(
            "Sinners".to_string(),
            vec![ScoredComment {
                text: "</script><b>boo</b>".into(),
                scores: PolarityScores { compound: 0.6, ..Default::default() },
                sentiment: Sentiment::Positive,
            }],
        );
        let dash = build_dashboard(&youtube, &BTreeMap::new(), Utc::now());
        let html = sentiment_page(&dash).unwrap();

        assert_eq!(html.matches("</script>").count(), 1);
        let payload = extract_payload(&html);
        assert_eq!(payload["movies"][0]["combined"]["top_comments"]["positive"][0]["text"], "</script><b>boo</b>");
        assert!(html.contains("<td>Sinners</td>"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("A & <B> \"c\""), "A &amp; &lt;B&gt; &quot;c&quot;");
    }

    #[test]
    fn test_comparison_page_embeds_summary() {
        let snapshot = MarketSnapshot {
            timestamp: Utc::now(),
            total_markets_scanned: 0,
            movies: vec![],
        };
        let html = comparison_page(&build_comparison(&snapshot, Utc::now())).unwrap();
        let payload = extract_payload(&html);
        assert_eq!(payload["summary"]["total_markets_scanned"], 0);
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_sentiment_page_lists_rankings() {
        let scored = |text: &str, compound: f64| ScoredComment {
            text: text.into(),
            scores: PolarityScores { compound, ..Default::default() },
            sentiment: Sentiment::from_compound(compound),
        };
        let youtube = BTreeMap::from([
            ("Hamnet".to_string(), vec![scored("ok", 0.0)]),
            ("Sinners".to_string(), vec![scored("great", 0.8), scored("good", 0.4)]),
        ]);
        let html = sentiment_page(&build_dashboard(&youtube, &BTreeMap::new(), Utc::now())).unwrap();

        assert!(html.contains("<h2>Rankings</h2>"));
        assert!(html.contains("<tr><td>1</td><td>Sinners</td><td>Sinners</td><td>Sinners</td></tr>"));
        let payload = extract_payload(&html);
        assert_eq!(payload["comparison"]["movies"][0]["median_compound"], 0.6);
    }

    #[test]
    fn test_campaign_page_highlights_focus() {
        use crate::campaign::{focus_report, prioritize, CampaignWeights, GroupMetrics};
        use crate::sentiment::ingest::CommentSource;

        let metrics = |movie: &str, intent: f64| GroupMetrics {
            movie: movie.into(),
            video_title: None,
            source: CommentSource::Youtube,
            n: 20,
            avg_compound: 0.2,
            pos_rate: 40.0,
            neg_rate: 10.0,
            neu_rate: 50.0,
            intent_rate: intent,
            craft_rate: 10.0,
            music_rate: 5.0,
            perf_rate: 5.0,
            family_rate: 5.0,
            confusion_rate: 0.0,
            toxicity_rate: 0.0,
        };
        let rows = prioritize(
            &[metrics("One Battle After Another", 8.0), metrics("Sinners & Co", 12.0)],
            CampaignWeights::default(),
        );
        let focus = focus_report(&rows, "one battle").unwrap();
        let html = campaign_page(&rows, Some(&focus)).unwrap();

        assert!(html.contains("<title>One Battle After Another Campaign Dashboard</title>"));
        assert!(html.contains("<tr class=\"focus\"><td>One Battle After Another</td>"));
        assert!(html.contains("<td>Sinners &amp; Co</td>"));
        assert!(html.contains("intent rank 2 of 2"));
        assert!(html.contains("<span class=\"down\">-4.000</span>"));

        let payload = extract_payload(&html);
        assert_eq!(payload["focus"]["sources"][0]["deltas"]["intent_rate"], -4.0);
        assert_eq!(payload["prioritization"].as_array().unwrap().len(), 2);

        let plain = campaign_page(&rows, None).unwrap();
        assert!(!plain.contains("class=\"focus\""));
        assert!(extract_payload(&plain)["focus"].is_null());
    }

    #[test]
    fn test_write_page_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dash.html");
        write_page(&path, "<html></html>").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
