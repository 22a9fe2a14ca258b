//! Viewer data API service.
//!
//! Serves the map-based viewer with:
//! - Catalog listings for the run pull-downs
//! - Aggregated, normalized variable data per run
//! - Partial results under per-source failure, bounded by one request
//!   deadline

mod auth;
mod handlers;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Extension, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use state::AppState;

#[derive(Parser, Debug)]
#[command(name = "surge-api")]
#[command(about = "Aggregated model-run data API for the surge viewer")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "SURGE_API_PORT", default_value = "8080")]
    port: u16,

    /// PostgreSQL catalog URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Overall per-request deadline in seconds
    #[arg(long, env = "SURGE_REQUEST_DEADLINE_SECS", default_value = "30")]
    request_deadline_secs: u64,

    /// Per-open connection timeout for remote sources, seconds
    #[arg(long, env = "SURGE_CONNECT_TIMEOUT_SECS", default_value = "5")]
    connect_timeout_secs: u64,

    /// Per-read timeout for remote sources, seconds
    #[arg(long, env = "SURGE_READ_TIMEOUT_SECS", default_value = "5")]
    read_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let state = Arc::new(AppState::new(&args).await?);

    // the viewer is a browser client on another origin
    let cors = CorsLayer::permissive();

    let guarded = Router::new()
        .route("/runs", get(handlers::list_runs))
        .route("/runs/:run_id/data", get(handlers::run_data))
        .layer(middleware::from_fn(auth::bearer_guard));

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(guarded)
        .layer(Extension(state))
        .layer(cors);

    let addr = format!("0.0.0.0:{}", args.port);
    info!(addr = %addr, "surge-api listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server failed")?;

    Ok(())
}
