// Prometheus metrics for the grader API
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use tracing::warn;

lazy_static! {
    pub static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "grader_http_requests_total",
        "HTTP requests by endpoint and response status",
        &["endpoint", "status"]
    )
    .expect("metric registration");

    pub static ref GRADING_DURATION: HistogramVec = register_histogram_vec!(
        "grader_grading_duration_seconds",
        "Wall time of grading requests by mode and outcome",
        &["mode", "outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0]
    )
    .expect("metric registration");

    pub static ref REJECTED_SUBMISSIONS: IntCounterVec = register_int_counter_vec!(
        "grader_rejected_submissions_total",
        "Submissions rejected before execution, by mode",
        &["mode"]
    )
    .expect("metric registration");
}

pub fn record_request(endpoint: &str, status: axum::http::StatusCode) {
    HTTP_REQUESTS
        .with_label_values(&[endpoint, status.as_str()])
        .inc();
}

pub fn observe_grading(mode: &str, outcome: &str, duration_ms: u64) {
    GRADING_DURATION
        .with_label_values(&[mode, outcome])
        .observe(duration_ms as f64 / 1000.0);
}

/// Text exposition of every registered metric
pub fn render() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}
