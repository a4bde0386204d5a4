use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

const PREFIX: &str = "srms";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    pub static ref AUTH_LOGIN_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_login_attempts_total"), "Total login attempts"),
        &["status"]
    ).expect("Failed to create auth_login_attempts_total metric");

    pub static ref AUTH_LOGIN_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_auth_login_duration_seconds"),
            "Login request duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0])
    ).expect("Failed to create auth_login_duration_seconds metric");

    // Workflow Metrics
    pub static ref WORKFLOW_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_workflow_transitions_total"),
            "Transition requests by target state and outcome"
        ),
        &["target", "outcome"]
    ).expect("Failed to create workflow_transitions_total metric");

    pub static ref RESULTS_CREATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_results_created_total"), "Result creation requests by outcome"),
        &["outcome"]
    ).expect("Failed to create results_created_total metric");
}

pub fn init_metrics() {
    // Already registered is fine, tests call this repeatedly.
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WORKFLOW_TRANSITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RESULTS_CREATED_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Collapses id segments so per-result paths share one label value.
pub fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    let path = normalize_path(path);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, &path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, &path])
        .observe(duration.as_secs_f64());
}

pub fn record_login_attempt(status: &str, duration: Duration) {
    AUTH_LOGIN_ATTEMPTS_TOTAL.with_label_values(&[status]).inc();
    AUTH_LOGIN_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// `outcome` is "ok" or a workflow error kind.
pub fn record_transition(target: &str, outcome: &str) {
    WORKFLOW_TRANSITIONS_TOTAL
        .with_label_values(&[target, outcome])
        .inc();
}

pub fn record_result_created(outcome: &str) {
    RESULTS_CREATED_TOTAL.with_label_values(&[outcome]).inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
