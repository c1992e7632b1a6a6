//! Integration tests for the forwarder API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use forwarder_lib::{
    api::{create_router, AppState},
    health::{components, HealthRegistry},
    observability::ForwarderMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::POLLER).await;
    health_registry.register(components::DISCOVERY).await;
    health_registry.register(components::FORWARDER).await;

    let state = Arc::new(AppState::new(health_registry, ForwarderMetrics::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, body.to_vec(), content_type)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body, _) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["poller"].is_object());
    assert!(health["components"]["discovery"].is_object());
    assert!(health["components"]["forwarder"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_discovery_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::DISCOVERY, "Failed to list services")
        .await;

    let (status, body, _) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["discovery"]["message"],
        "Failed to list services"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::FORWARDER, "Bulk endpoint unreachable")
        .await;

    let (status, body, _) = get(app, "/healthz").await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_startup_and_health() {
    let (app, state) = setup_test_app().await;

    let (status, body, _) = get(app.clone(), "/readyz").await;
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, body, _) = get(app.clone(), "/readyz").await;
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    state
        .health_registry
        .set_unhealthy(components::POLLER, "Failed")
        .await;
    let (status, _, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.observe_poll_cycle(Duration::from_millis(15));
    state.metrics.add_documents(8);
    state.metrics.add_fetch_errors(1);
    state.metrics.inc_bulk_submissions();
    state.metrics.set_buffer_documents(0);
    state.metrics.set_instances_polled(4);

    let (status, body, content_type) = get(app, "/metrics").await;
    let metrics_text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().contains("text/plain"));
    assert!(metrics_text.contains("metric_forwarder_poll_cycle_seconds_bucket"));
    assert!(metrics_text.contains("metric_forwarder_poll_cycle_seconds_count"));
    assert!(metrics_text.contains("metric_forwarder_documents_total"));
    assert!(metrics_text.contains("metric_forwarder_fetch_errors_total"));
    assert!(metrics_text.contains("metric_forwarder_bulk_submissions_total"));
    assert!(metrics_text.contains("metric_forwarder_bulk_failures_total"));
    assert!(metrics_text.contains("metric_forwarder_buffer_documents"));
    assert!(metrics_text.contains("metric_forwarder_instances_polled"));
}
