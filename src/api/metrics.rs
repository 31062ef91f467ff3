//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions the engine calls to record domain events

use anyhow::Context;
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const SESSIONS_STARTED_TOTAL: &str = "browse_sessions_started_total";
pub const SESSIONS_NUKED_TOTAL: &str = "browse_sessions_nuked_total";
pub const SESSIONS_ACTIVE: &str = "browse_sessions_active";
pub const THREATS_DETECTED_TOTAL: &str = "threats_detected_total";
pub const CHAT_COMPLETIONS_TOTAL: &str = "chat_completions_total";
pub const PAYMENTS_TOTAL: &str = "payments_total";

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Call once during startup; a second install fails.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(SESSIONS_STARTED_TOTAL, "Browse sessions started, by threat level");
    describe_counter!(SESSIONS_NUKED_TOTAL, "Browse sessions destroyed, by reason (user/expired)");
    describe_gauge!(SESSIONS_ACTIVE, "Browse sessions currently active");
    describe_counter!(THREATS_DETECTED_TOTAL, "Threat verdicts recorded, by threat type");
    describe_counter!(CHAT_COMPLETIONS_TOTAL, "Assistant replies, by outcome (ok/fallback)");
    describe_counter!(PAYMENTS_TOTAL, "Payment state changes, by status");

    Ok(handle)
}

/// GET /metrics - Returns Prometheus-formatted metrics.
///
/// This endpoint is accessible without authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    let Ok(pool) = state.store.pool() else {
        return;
    };
    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM browse_sessions WHERE status = 'active'")
            .fetch_one(pool)
            .await
    {
        gauge!(SESSIONS_ACTIVE).set(count as f64);
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
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

pub fn record_session_started(threat_level: &str) {
    counter!(SESSIONS_STARTED_TOTAL, "threat_level" => threat_level.to_string()).increment(1);
}

pub fn record_session_nuked(reason: &'static str, count: u64) {
    counter!(SESSIONS_NUKED_TOTAL, "reason" => reason).increment(count);
}

pub fn record_threat_detected(threat_type: &str) {
    counter!(THREATS_DETECTED_TOTAL, "threat_type" => threat_type.to_string()).increment(1);
}

pub fn record_chat_completion(outcome: &'static str) {
    counter!(CHAT_COMPLETIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_payment(status: &'static str) {
    counter!(PAYMENTS_TOTAL, "status" => status).increment(1);
}
