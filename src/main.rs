//! Iris Prediction Server
//!
//! Serves the prediction dashboard, classifies iris measurements with a
//! pre-trained model and keeps a history of every prediction for stats.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  IRIS PREDICTION SERVER                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │  HTTP     │  │  Prediction  │  │  Stats Aggregator    │ │
//! │  │  (Axum)   │─▶│  Service     │  │                      │ │
//! │  └─────┬─────┘  └──────┬───────┘  └──────────┬───────────┘ │
//! │        │        ┌──────┴──────┐              │              │
//! │        │        │ Model Store │              │              │
//! │        │        └─────────────┘              │              │
//! │        └───────────────┬─────────────────────┘              │
//! │                        ▼                                    │
//! │                ┌───────────────┐                            │
//! │                │ Prediction Log│ (PostgreSQL)               │
//! │                └───────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod classifier;
mod model_store;
mod models;
mod prediction_log;
mod prediction;
mod stats;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

use db::StoreOrigin;
use model_store::ModelStore;
use prediction_log::{PgPredictionLog, PredictionLog};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iris_prediction_server=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = config::Config::from_env();

    tracing::info!("Iris Prediction Server starting...");
    if config.uses_default_secret() && config.is_production() {
        tracing::warn!("SECRET_KEY is not set; using the built-in default");
    }

    // Model artifacts are required; there is no degraded mode without them
    let models = ModelStore::load(&config.model_dir)
        .with_context(|| format!("loading model artifacts from {}", config.model_dir.display()))?;
    tracing::info!(
        "Models loaded: {} classes, features {:?}",
        models.class_names().len(),
        models.feature_names()
    );

    let (pool, store_origin) = db::connect_with_fallback(&config)
        .await
        .context("connecting to the prediction database")?;
    tracing::info!("Prediction log using {} database", store_origin);

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("applying database schema")?;

    let state = AppState {
        models: Arc::new(models),
        log: Arc::new(PgPredictionLog::new(pool)),
        config: config.clone(),
        store_origin,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelStore>,
    pub log: Arc<dyn PredictionLog>,
    pub config: config::Config,
    pub store_origin: StoreOrigin,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/predict", post(handlers::predict::predict))
        .route("/api/stats", get(handlers::stats::get))
        .route("/api/clear-history", post(handlers::history::clear));

    Router::new()
        .route("/", get(handlers::dashboard::index))
        .route("/health", get(handlers::health::check))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
