//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Besides per-route request counts and latencies this tracks auth events,
//! stored uploads, views and the size of the catalog.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const AUTH_EVENTS_TOTAL: &str = "auth_events_total";
pub const UPLOADS_TOTAL: &str = "uploads_total";
pub const VIEWS_TOTAL: &str = "views_total";
pub const CATALOG_ITEMS: &str = "catalog_items";
pub const USERS_TOTAL: &str = "users_total";

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        AUTH_EVENTS_TOTAL,
        "Registrations, logins and failed logins"
    );
    describe_counter!(UPLOADS_TOTAL, "Files stored by upload field");
    describe_counter!(VIEWS_TOTAL, "Recorded views by item kind");
    describe_gauge!(CATALOG_ITEMS, "Number of books and videos by kind");
    describe_gauge!(USERS_TOTAL, "Number of registered users");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    for (kind, table) in [("book", "books"), ("video", "videos")] {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        if let Ok(count) = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&state.db).await {
            gauge!(CATALOG_ITEMS, "kind" => kind).set(count as f64);
        }
    }

    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
    {
        gauge!(USERS_TOTAL).set(count as f64);
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds` per matched route
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// `event` is one of register, login, login_failed
pub fn record_auth_event(event: &'static str) {
    counter!(AUTH_EVENTS_TOTAL, "event" => event).increment(1);
}

pub fn record_upload(field: &'static str) {
    counter!(UPLOADS_TOTAL, "field" => field).increment(1);
}

pub fn record_view(kind: &'static str) {
    counter!(VIEWS_TOTAL, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(HTTP_REQUESTS_TOTAL.ends_with("_total"));
        assert!(AUTH_EVENTS_TOTAL.ends_with("_total"));
        assert!(UPLOADS_TOTAL.ends_with("_total"));
        assert!(VIEWS_TOTAL.ends_with("_total"));
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_events_are_rendered_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_auth_event("login");
            record_auth_event("login");
            record_upload("bookImage");
            record_view("video");
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"auth_events_total{event="login"} 2"#));
        assert!(rendered.contains(r#"uploads_total{field="bookImage"} 1"#));
        assert!(rendered.contains(r#"views_total{kind="video"} 1"#));
    }

}
