use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/api/problems", get(handlers::list_problems))
        .route("/api/problems/:slug/description", get(handlers::problem_description))
        .route("/api/problems/:slug/template", get(handlers::problem_template))
        .route("/api/problems/:slug/cases", get(handlers::case_count))
        .route("/api/code/run", post(handlers::run_code))
        .route("/api/code/submit", post(handlers::submit_code))
}
