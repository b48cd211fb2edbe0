//! Oscars Campaign Web Server
//!
//! Market comparison, template onboarding and meme generation over HTTP.

use anyhow::{Context, Result};
use oscars_campaign::api::{create_app, AppState};
use oscars_campaign::config::LlmProvider;
use oscars_campaign::Config;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Override with RUST_LOG, e.g. RUST_LOG=oscars_campaign=debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("oscars_campaign=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let addr = config.bind_addr();

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       OSCARS CAMPAIGN - WEB SERVER                           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  LLM Provider: {:<45} ║", match config.llm_provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Mock => "mock (no network)",
    });
    println!("║  Registry: {:<49} ║", config.registry_dir.display().to_string());
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    info!("Initializing application state...");
    let state = AppState::new(config).await?;
    let app = create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    println!();
    println!("  API:       http://{}/api", addr);
    println!("  Memes:     http://{}/memes", addr);
    println!("  Health:    http://{}/health", addr);
    println!();

    axum::serve(listener, app).await?;

    Ok(())
}
