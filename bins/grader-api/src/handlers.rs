// HTTP route handlers for the grader API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use grader_common::types::{BatchResult, Submission};
use grader_engine::problems::ProblemRepository;
use grader_engine::GradeError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCodeRequest {
    pub problem_slug: String,
    pub code: String,
    #[serde(default)]
    pub test_case_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCodeRequest {
    pub problem_slug: String,
    pub code: String,
}

fn status_for(err: &GradeError) -> StatusCode {
    match err {
        GradeError::ProblemNotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// GET /api/problems - Sorted problem slugs
pub async fn list_problems(State(state): State<Arc<AppState>>) -> Response {
    let response = match state.problems.list_slugs().await {
        Ok(slugs) => (StatusCode::OK, Json(slugs)).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list problems");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };
    metrics::record_request("list_problems", response.status());
    response
}

/// GET /api/problems/:slug/description
pub async fn problem_description(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Response {
    let response = text_or_error(state.problems.description(&slug).await);
    metrics::record_request("description", response.status());
    response
}

/// GET /api/problems/:slug/template
pub async fn problem_template(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Response {
    let response = text_or_error(state.problems.template(&slug).await);
    metrics::record_request("template", response.status());
    response
}

fn text_or_error(result: Result<String, GradeError>) -> Response {
    match result {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        Err(e) => error_body(status_for(&e), e.to_string()),
    }
}

/// GET /api/problems/:slug/cases - Number of declared test cases
pub async fn case_count(State(state): State<Arc<AppState>>, Path(slug): Path<String>) -> Response {
    let response = match state.grader.case_count(&slug).await {
        Ok(count) => (StatusCode::OK, Json(serde_json::json!({ "count": count }))).into_response(),
        Err(e) => {
            warn!(slug = %slug, error = %e, "Failed to count test cases");
            error_body(status_for(&e), e.to_string())
        }
    };
    metrics::record_request("cases", response.status());
    response
}

/// POST /api/code/run - Run one test case
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunCodeRequest>,
) -> Response {
    let start = Instant::now();
    let submission = Submission::new(payload.problem_slug, payload.code);
    let case_index = payload.test_case_index.unwrap_or(0);

    let (status, result) = match state.grader.try_run_one(&submission, case_index).await {
        Ok(result) => (StatusCode::OK, result),
        Err(e) => {
            let status = status_for(&e);
            if matches!(e, GradeError::ValidationRejected(_)) {
                metrics::REJECTED_SUBMISSIONS.with_label_values(&["run"]).inc();
            }
            warn!(slug = %submission.problem_slug, case_index, error = %e, "Run request failed");
            (status, e.into_result(start.elapsed().as_millis() as u64))
        }
    };

    info!(
        slug = %submission.problem_slug,
        case_index,
        status = %result.status(),
        duration_ms = result.duration_ms,
        "Run completed"
    );
    metrics::observe_grading("run", &result.status().to_string(), result.duration_ms);
    metrics::record_request("run", status);
    (status, Json(result)).into_response()
}

/// POST /api/code/submit - Run the full test suite
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitCodeRequest>,
) -> Response {
    let start = Instant::now();
    let submission = Submission::new(payload.problem_slug, payload.code);

    let (status, result) = match state.grader.try_grade_all(&submission).await {
        Ok(result) => (StatusCode::OK, result),
        Err(e) => {
            let status = status_for(&e);
            if matches!(e, GradeError::ValidationRejected(_)) {
                metrics::REJECTED_SUBMISSIONS.with_label_values(&["submit"]).inc();
            }
            warn!(slug = %submission.problem_slug, error = %e, "Submit request failed");
            (
                status,
                BatchResult::error(e.to_string(), start.elapsed().as_millis() as u64),
            )
        }
    };

    info!(
        slug = %submission.problem_slug,
        status = %result.status,
        passed = result.passed_count,
        total = result.total_count,
        duration_ms = result.duration_ms,
        "Submission graded"
    );
    metrics::observe_grading("submit", &result.status.to_string(), result.duration_ms);
    metrics::record_request("submit", status);
    (status, Json(result)).into_response()
}
