mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use grader_common::config::GraderConfig;
use grader_engine::problems::FsProblemRepository;
use grader_engine::Grader;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub grader: Grader,
    pub problems: FsProblemRepository,
}

impl AppState {
    pub fn new(config: GraderConfig) -> Self {
        Self {
            problems: FsProblemRepository::new(&config.problems_root),
            grader: Grader::new(config),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Grader API booting...");

    let config = GraderConfig::load_default().context("Failed to load grader config")?;
    info!(
        problems_root = %config.problems_root.display(),
        run_timeout_ms = config.run_timeout_ms,
        batch_timeout_ms = config.batch_timeout_ms,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config));

    let addr = std::env::var("GRADER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to grade submissions");

    axum::serve(listener, app(state)).await.context("Server error")?;
    Ok(())
}
