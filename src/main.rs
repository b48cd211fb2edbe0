//! Oscars Campaign CLI
//!
//! Batch jobs for the campaign: comment sentiment, campaign scoring, market
//! snapshots, dashboards, template onboarding and meme generation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use oscars_campaign::campaign::{focus_report, run_campaign_analysis, write_focus_report, write_report};
use oscars_campaign::dashboard::{campaign_page, comparison_page, sentiment_page, write_page};
use oscars_campaign::markets::{build_comparison, Comparison, KalshiClient, MarketCache, SystemClock};
use oscars_campaign::memes::render::load_font;
use oscars_campaign::memes::{GenerationRequest, DEFAULT_TARGET};
use oscars_campaign::sentiment::compare::{compare_movies, load_results_dir, write_comparison};
use oscars_campaign::sentiment::ingest::{load_export, load_source_dir, CommentSource};
use oscars_campaign::sentiment::report::{analyze_export, build_dashboard, write_export_csvs};
use oscars_campaign::sentiment::{SentimentStats, VaderScorer};
use oscars_campaign::templates::registry::init_dir;
use oscars_campaign::templates::{LogObserver, TemplateIntegrator, TemplatePipeline, TemplateRegistry};
use oscars_campaign::{llm, CommentDatabase, Config, MemeCategory, MemePipeline, MemeRenderer, Tone};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "oscars-campaign")]
#[command(about = "Sentiment, market odds and meme tooling for an Oscars campaign")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score YouTube comment exports and write per-movie CSVs
    Sentiment {
        /// Export files (comments_*.json)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory for CSVs (defaults to DATA_DIR)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Top comments to show per video
        #[arg(short, long, default_value = "5")]
        top: usize,
    },

    /// Keyword-weighted campaign prioritization across movies
    Campaign {
        /// Directory of comments_*.json exports (defaults to DATA_DIR/youtube)
        #[arg(long)]
        youtube_dir: Option<PathBuf>,

        /// Directory of reddit_*.json exports (defaults to DATA_DIR/reddit)
        #[arg(long)]
        reddit_dir: Option<PathBuf>,

        /// Output directory (defaults to DATA_DIR/campaign)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Movie to compare against the rest (substring match)
        #[arg(long, default_value = DEFAULT_TARGET)]
        focus: String,
    },

    /// Compare movies from their sentiment_results_*.csv files
    Compare {
        /// Directory holding the CSVs (defaults to DATA_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Fetch Oscar markets from Kalshi and show the comparison
    Markets {
        /// Print the comparison JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Write a static HTML dashboard
    Dashboard {
        #[arg(value_enum)]
        kind: DashboardKind,

        /// Output HTML file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the template analysis pipeline on an image
    ProcessTemplate {
        /// Template image (png, jpg, webp)
        image: PathBuf,

        /// Merge the result into the registry
        #[arg(long)]
        integrate: bool,

        /// Override the generated template id
        #[arg(long)]
        id: Option<String>,
    },

    /// Generate and render campaign memes
    Generate {
        /// pro_obaa or anti_sinners
        #[arg(short, long, default_value = "pro_obaa")]
        category: String,

        /// Number of memes (1-12)
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Template ids to use (defaults to every usable template)
        #[arg(short, long)]
        templates: Vec<String>,

        #[arg(long, value_enum, default_value = "savage")]
        tone: ToneArg,

        /// Extra themes to steer the copy
        #[arg(long)]
        theme: Vec<String>,
    },

    /// List registered templates
    Templates,
}

#[derive(Clone, Copy, ValueEnum)]
enum DashboardKind {
    Sentiment,
    Markets,
    Campaign,
}

#[derive(Clone, Copy, ValueEnum)]
enum ToneArg {
    Savage,
    Playful,
    Sarcastic,
}

impl From<ToneArg> for Tone {
    fn from(tone: ToneArg) -> Self {
        match tone {
            ToneArg::Savage => Tone::Savage,
            ToneArg::Playful => Tone::Playful,
            ToneArg::Sarcastic => Tone::Sarcastic,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Sentiment { files, out_dir, top } => {
            let out_dir = out_dir.unwrap_or_else(|| config.data_dir.clone());
            analyze_sentiment(&files, &out_dir, top)?
        }
        Commands::Campaign { youtube_dir, reddit_dir, out_dir, focus } => {
            run_campaign(&config, youtube_dir, reddit_dir, out_dir, &focus)?
        }
        Commands::Compare { dir } => compare(&dir.unwrap_or_else(|| config.data_dir.clone()))?,
        Commands::Markets { json } => show_markets(&config, json).await?,
        Commands::Dashboard { kind, out } => write_dashboard(&config, kind, out).await?,
        Commands::ProcessTemplate { image, integrate, id } => process_template(&config, &image, integrate, id).await?,
        Commands::Generate { category, count, templates, tone, theme } => {
            let category = MemeCategory::parse(&category)
                .with_context(|| format!("Unknown category '{}', expected pro_obaa or anti_sinners", category))?;
            let mut request = GenerationRequest::new(category);
            request.num_memes = count;
            request.templates = (!templates.is_empty()).then_some(templates);
            request.tone = tone.into();
            request.custom_themes = theme;
            generate_memes(&config, request).await?
        }
        Commands::Templates => list_templates(&config)?,
    }

    Ok(())
}

fn header(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("  {}", title);
    println!("{}\n", "=".repeat(70));
}

fn print_stats(label: &str, stats: &SentimentStats) {
    println!(
        "{:<40} {:>5} comments | {} | {} | {} | avg {:+.3}",
        label,
        stats.total,
        format!("+{:.1}%", stats.positive_pct).green(),
        format!("-{:.1}%", stats.negative_pct).red(),
        format!("~{:.1}%", stats.neutral_pct).dimmed(),
        stats.avg_compound
    );
}

fn analyze_sentiment(files: &[PathBuf], out_dir: &Path, top: usize) -> Result<()> {
    header("COMMENT SENTIMENT");

    for path in files {
        let export = load_export(path)?;
        let analysis = analyze_export(&export, &VaderScorer, top);

        println!("{}", analysis.movie.bold());
        println!("{}", "-".repeat(70));
        for video in &analysis.videos {
            print_stats(&video.title, &video.stats);
            for c in &video.top.positive {
                println!("   {} {:+.3} \"{}\"", "▲".green(), c.compound, c.text);
            }
            for c in &video.top.negative {
                println!("   {} {:+.3} \"{}\"", "▼".red(), c.compound, c.text);
            }
        }
        print_stats("OVERALL", &analysis.overall);

        let (results, summary) = write_export_csvs(&analysis, out_dir)?;
        println!("\nWrote {} and {}\n", results.display(), summary.display());
    }

    Ok(())
}

fn run_campaign(
    config: &Config,
    youtube_dir: Option<PathBuf>,
    reddit_dir: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    focus: &str,
) -> Result<()> {
    header("CAMPAIGN PRIORITIZATION");

    let youtube_dir = youtube_dir.unwrap_or_else(|| config.data_dir.join("youtube"));
    let reddit_dir = reddit_dir.unwrap_or_else(|| config.data_dir.join("reddit"));
    let out_dir = out_dir.unwrap_or_else(|| config.data_dir.join("campaign"));

    let report = run_campaign_analysis(&youtube_dir, Some(&reddit_dir), &VaderScorer)?;

    for row in &report.prioritization {
        println!(
            "{:<32} {:<8} n={:<5} best: {} ({:.3})",
            row.movie,
            row.source.to_string(),
            row.n,
            row.best_campaign.cyan(),
            row.best_score
        );
    }

    write_report(&report, &out_dir)?;

    if let Some(focus) = focus_report(&report.prioritization, focus) {
        header(&format!("{} VS COHORT", focus.focus_movie.to_uppercase()));
        for summary in &focus.sources {
            println!(
                "{:<8} intent rank {} of {} | cohort intent mean {}",
                summary.source.to_string(),
                summary.intent_rank,
                summary.cohort_n_movies,
                summary.cohort_intent_mean.map_or("-".to_string(), |m| format!("{:.2}", m))
            );
            for (key, delta) in &summary.deltas {
                let text = format!("{:+.3}", delta);
                let text = if *delta >= 0.0 { text.green() } else { text.red() };
                println!("   {:<30} {}", key, text);
            }
        }
        write_focus_report(&focus, &out_dir)?;
    }

    println!("\nReport written to {}", out_dir.display());
    Ok(())
}

fn compare(dir: &Path) -> Result<()> {
    let movies = load_results_dir(dir)?;
    if movies.is_empty() {
        anyhow::bail!("No sentiment_results_*.csv files in {}", dir.display());
    }
    let comparison = compare_movies(&movies);

    header("MOVIE SENTIMENT COMPARISON");
    for (i, row) in comparison.movies.iter().enumerate() {
        println!("{:>3}. {}", i + 1, row.movie.bold());
        println!(
            "     avg {:+.3} | median {:+.3} | std {:.3} | {} | {} | {}",
            row.avg_compound,
            row.median_compound,
            row.std_compound,
            format!("+{:.1}%", row.positive_pct).green(),
            format!("-{:.1}%", row.negative_pct).red(),
            format!("~{:.1}%", row.neutral_pct).dimmed()
        );
        println!("     {} comments", row.total_comments);
    }

    println!("\nKEY INSIGHTS");
    println!("{}", "-".repeat(70));
    if let Some(m) = comparison.most_positive() {
        println!("  Most positive reception: {} ({:.1}% positive)", m.movie, m.positive_pct);
    }
    if let Some(m) = comparison.most_controversial() {
        println!("  Most controversial:      {} ({:.1}% negative)", m.movie, m.negative_pct);
    }
    if let Some(m) = comparison.most_engaged() {
        println!("  Most engagement:         {} ({} comments)", m.movie, m.total_comments);
    }

    let (csv_path, json_path) = write_comparison(&comparison, dir)?;
    println!("\nWrote {} and {}\n", csv_path.display(), json_path.display());
    Ok(())
}

fn kalshi_client(config: &Config) -> Result<KalshiClient> {
    let cache = Arc::new(MarketCache::new(
        chrono::Duration::minutes(config.cache_ttl_minutes),
        config.cache_dir.clone(),
        Arc::new(SystemClock),
    ));
    KalshiClient::new(config, cache)
}

async fn fetch_comparison(config: &Config) -> Result<Comparison> {
    let client = kalshi_client(config)?;
    let snapshot = client.fetch_all_oscar_markets().await;
    Ok(build_comparison(&snapshot, chrono::Utc::now()))
}

async fn show_markets(config: &Config, json: bool) -> Result<()> {
    let comparison = fetch_comparison(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    header("KALSHI OSCAR MARKETS");
    println!(
        "Scanned {} markets, {} movies\n",
        comparison.summary.total_markets_scanned, comparison.summary.movies_analyzed
    );

    let odds = |v: Option<i64>| v.map_or("-".to_string(), |c| format!("{}c", c));
    for movie in &comparison.movies {
        println!("{} ({}, {})", movie.name.bold(), movie.director, movie.year);
        println!(
            "   {} markets | vol {} | OI {} | Picture {} | Director {} | Actor {} | Actress {}",
            movie.metrics.total_markets,
            movie.metrics.total_volume,
            movie.metrics.total_open_interest,
            odds(movie.best_picture_odds),
            odds(movie.best_director_odds),
            odds(movie.best_actor_odds),
            odds(movie.best_actress_odds)
        );
    }

    if !comparison.head_to_head.is_empty() {
        println!("\nHEAD TO HEAD");
        println!("{}", "-".repeat(70));
        for h2h in &comparison.head_to_head {
            let prices: Vec<String> = h2h
                .markets
                .iter()
                .map(|(name, m)| format!("{} {}c", name, m.price))
                .collect();
            let leader = h2h.leader.as_deref().unwrap_or("tie");
            println!("{:<28} {} -> {}", h2h.category, prices.join(" vs "), leader.green());
        }
    }

    println!();
    Ok(())
}

async fn write_dashboard(config: &Config, kind: DashboardKind, out: Option<PathBuf>) -> Result<()> {
    let (html, default_name) = match kind {
        DashboardKind::Sentiment => {
            let youtube = load_source_dir(&config.data_dir.join("youtube"), CommentSource::Youtube, &VaderScorer)?;
            let reddit = load_source_dir(&config.data_dir.join("reddit"), CommentSource::Reddit, &VaderScorer)?;
            let dashboard = build_dashboard(&youtube, &reddit, chrono::Utc::now());
            (sentiment_page(&dashboard)?, "sentiment_dashboard.html")
        }
        DashboardKind::Markets => {
            let comparison = fetch_comparison(config).await?;
            (comparison_page(&comparison)?, "kalshi_dashboard.html")
        }
        DashboardKind::Campaign => {
            let report = run_campaign_analysis(
                &config.data_dir.join("youtube"),
                Some(&config.data_dir.join("reddit")),
                &VaderScorer,
            )?;
            let focus = focus_report(&report.prioritization, DEFAULT_TARGET);
            (campaign_page(&report.prioritization, focus.as_ref())?, "campaign_dashboard.html")
        }
    };

    let path = out.unwrap_or_else(|| config.output_dir.join(default_name));
    write_page(&path, &html)?;
    info!("[Dashboard] Wrote {}", path.display());
    Ok(())
}

fn load_registry(config: &Config) -> Result<TemplateRegistry> {
    init_dir(&config.registry_dir)
        .with_context(|| format!("Failed to initialize registry at {}", config.registry_dir.display()))?;
    Ok(TemplateRegistry::load(&config.registry_dir)?)
}

async fn process_template(config: &Config, image: &Path, integrate: bool, id: Option<String>) -> Result<()> {
    header(&format!("TEMPLATE PIPELINE - {}", image.display()));

    let registry = load_registry(config)?;
    let llm = llm::from_config(config)?;
    let pipeline = TemplatePipeline::new(llm, config.vision_model.clone(), config.stage_timeout);

    let existing = registry.templates().cloned().collect();
    let mut result = pipeline.process(image, existing, &LogObserver).await?;
    if let Some(id) = id {
        let overrides = BTreeMap::from([("id".to_string(), id)]);
        result = result.with_overrides(&overrides);
    }

    let entry = result.registry_entry();
    println!("\n{} ({})", entry.name.bold(), entry.id);
    println!("   Irony: {} | Tone: {}", entry.irony_type, entry.tone);
    println!("   Slots: {} (max {} chars)", entry.slot_names.join(", "), entry.max_chars_per_slot);
    println!("   {}", entry.description);

    if !integrate {
        println!("\n{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    result.metadata.filename = result.image_filename();
    if let Some(owner) = registry.image_owner(&result.metadata.filename, &result.metadata.id) {
        anyhow::bail!("{} already belongs to template '{}'", result.metadata.filename, owner.id);
    }

    std::fs::create_dir_all(&config.template_dir)?;
    std::fs::copy(image, config.template_dir.join(&result.metadata.filename))
        .with_context(|| format!("Failed to copy {} into {}", image.display(), config.template_dir.display()))?;

    let integrator = TemplateIntegrator::new(&config.registry_dir, &config.backup_dir);
    let report = integrator.integrate(&result).await;

    println!();
    for (artifact, outcome) in &report.steps {
        match outcome {
            Ok(()) => println!("   {} {}", "OK".green(), artifact.file_name()),
            Err(e) => println!("   {} {}: {}", "FAILED".red(), artifact.file_name(), e),
        }
    }

    if !report.success() {
        anyhow::bail!("Integration of '{}' incomplete", report.template_id);
    }
    Ok(())
}

async fn generate_memes(config: &Config, request: GenerationRequest) -> Result<()> {
    header(&format!(
        "MEME GENERATION - {} ({} vs {})",
        request.category, request.target_movie, request.competitor_movie
    ));

    let registry = load_registry(config)?;
    let llm = llm::from_config(config)?;
    let comments = Arc::new(CommentDatabase::new(&config.data_dir));
    let pipeline = MemePipeline::new(llm, comments, config.llm_model.clone());

    let font = load_font(config.font_path.as_deref());
    if font.is_none() {
        warn!("[Render] No font found; memes will not be rendered. Set MEME_FONT_PATH.");
    }
    let renderer = MemeRenderer::new(&config.template_dir, &config.output_dir, font);

    let batch = pipeline.generate_batch(&registry, &request).await?;

    for (i, meme) in batch.memes.iter().enumerate() {
        println!("{}. {} (confidence {:.2})", i + 1, meme.template_id.bold(), meme.confidence);
        for (slot, text) in &meme.text_content {
            println!("   {}: {}", slot.cyan(), text);
        }

        let Some(entry) = registry.get(&meme.template_id) else {
            continue;
        };
        match renderer.render(meme, entry, registry.layout(&entry.id), i + 1) {
            Ok(path) => println!("   -> {}", path.display()),
            Err(e) => println!("   {} {}", "render failed:".red(), e),
        }
    }

    for failure in &batch.failures {
        println!("{} {}: {}", "FAILED".red(), failure.template_id, failure.error);
    }

    println!("\nGenerated {} memes", batch.total_generated);
    Ok(())
}

fn list_templates(config: &Config) -> Result<()> {
    let registry = load_registry(config)?;
    header(&format!("TEMPLATES ({})", registry.len()));

    let usable: Vec<&str> = registry.usable().iter().map(|t| t.id.as_str()).collect();
    for t in registry.templates() {
        let marker = if usable.contains(&t.id.as_str()) { "●".green() } else { "○".dimmed() };
        println!(
            "{} {:<24} {:<28} {} slots  {}",
            marker,
            t.id,
            t.irony_type,
            t.text_slots,
            t.slot_names.join(", ")
        );
    }

    println!();
    Ok(())
}
