//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use regex::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "vprod_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vprod_http_request_duration_seconds";
    pub const TASKS_CREATED_TOTAL: &str = "vprod_tasks_created_total";
}

static TASK_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/api/tasks/[^/]+").unwrap());

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a submitted task.
pub fn record_task_created(task_type: &'static str) {
    counter!(names::TASKS_CREATED_TOTAL, "task_type" => task_type).increment(1);
}

/// Collapse task ids so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    TASK_ID_SEGMENT.replace(path, "/api/tasks/:id").into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/tasks/550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/api/tasks/:id/cancel"
        );
        assert_eq!(sanitize_path("/api/tasks/my-task"), "/api/tasks/:id");
        assert_eq!(sanitize_path("/api/tasks"), "/api/tasks");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
