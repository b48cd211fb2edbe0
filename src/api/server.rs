//! Axum server setup and configuration

use crate::api::routes;
use crate::comments::CommentDatabase;
use crate::config::Config;
use crate::llm::{self, LlmClient};
use crate::markets::{KalshiClient, MarketCache, SystemClock};
use crate::memes::{render::load_font, MemePipeline, MemeRenderer};
use crate::templates::registry::init_dir;
use crate::templates::{JobStore, TemplateIntegrator, TemplatePipeline, TemplateRegistry};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Largest accepted template upload
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kalshi: Arc<KalshiClient>,
    pub comments: Arc<CommentDatabase>,
    pub llm: Arc<dyn LlmClient>,
    /// Reloaded after every finalize
    pub registry: Arc<RwLock<TemplateRegistry>>,
    pub jobs: Arc<JobStore>,
    pub pipeline: Arc<TemplatePipeline>,
    pub integrator: Arc<TemplateIntegrator>,
    pub memes: Arc<MemePipeline>,
    pub renderer: Arc<MemeRenderer>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let cache = Arc::new(MarketCache::new(
            chrono::Duration::minutes(config.cache_ttl_minutes),
            config.cache_dir.clone(),
            Arc::new(SystemClock),
        ));
        let kalshi = KalshiClient::new(&config, cache)?;
        let llm = llm::from_config(&config)?;
        Self::build(config, llm, kalshi)
    }

    /// Assemble state around an existing LLM backend and market client
    pub fn build(config: Config, llm: Arc<dyn LlmClient>, kalshi: KalshiClient) -> Result<Self> {
        init_dir(&config.registry_dir)
            .with_context(|| format!("Failed to initialize registry at {}", config.registry_dir.display()))?;
        let registry = TemplateRegistry::load(&config.registry_dir)?;

        let font = load_font(config.font_path.as_deref());
        if font.is_none() {
            warn!("[Server] No font found; rendering is disabled until MEME_FONT_PATH is set");
        }

        let comments = Arc::new(CommentDatabase::new(&config.data_dir));
        let pipeline = TemplatePipeline::new(Arc::clone(&llm), config.vision_model.clone(), config.stage_timeout);
        let integrator = TemplateIntegrator::new(&config.registry_dir, &config.backup_dir);
        let memes = MemePipeline::new(Arc::clone(&llm), Arc::clone(&comments), config.llm_model.clone());
        let renderer = MemeRenderer::new(&config.template_dir, &config.output_dir, font);

        info!(
            "[Server] {} templates registered, LLM backend: {}",
            registry.len(),
            llm.name()
        );

        Ok(Self {
            config: Arc::new(config),
            kalshi: Arc::new(kalshi),
            comments,
            llm,
            registry: Arc::new(RwLock::new(registry)),
            jobs: Arc::new(JobStore::new()),
            pipeline: Arc::new(pipeline),
            integrator: Arc::new(integrator),
            memes: Arc::new(memes),
            renderer: Arc::new(renderer),
        })
    }
}

/// Create the Axum application with all routes
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/health", get(routes::markets::health))
        // Market routes
        .route("/comparison", get(routes::markets::comparison))
        .route("/movie/:name", get(routes::markets::movie))
        .route("/refresh", post(routes::markets::refresh))
        // Template routes
        .route("/templates", get(routes::templates::list_templates))
        .route("/templates/upload", post(routes::templates::upload_template))
        .route("/templates/process/:job_id", get(routes::templates::job_status))
        .route("/templates/finalize", post(routes::templates::finalize_template))
        .route("/templates/:id/preview", get(routes::templates::preview_template))
        // Meme routes
        .route("/memes", get(routes::memes::list_memes))
        .route("/memes/templates", get(routes::memes::generation_templates))
        .route("/memes/generate", post(routes::memes::generate_memes))
        .route("/memes/comments/:movie", get(routes::memes::movie_comments));

    let generated = ServeDir::new(&state.config.output_dir);
    let template_images = ServeDir::new(&state.config.template_dir);

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(routes::markets::health))
        .nest_service("/memes", generated)
        .nest_service("/templates", template_images)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
