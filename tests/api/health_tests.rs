//! Health Check API Tests

use axum::http::StatusCode;

use crate::common::{assert_status, body_json, TestApp};

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;

    assert_status(&response, StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("version").is_some());
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::new().await;

    let response = app.get("/health/live").await;

    assert_status(&response, StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "alive");
}

#[tokio::test]
async fn test_readiness_probe_with_memory_store() {
    let app = TestApp::new().await;

    let response = app.get("/health/ready").await;

    assert_status(&response, StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["store"]["status"], "healthy");
    assert_eq!(json["checks"]["hub"]["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_fails_after_hub_shutdown() {
    let app = TestApp::new().await;
    app.state.hub.shutdown();

    let response = app.get("/health/ready").await;

    assert_status(&response, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["checks"]["hub"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::new().await;

    let response = app.get("/metrics").await;

    assert_status(&response, StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_gateway_requires_token() {
    let app = TestApp::new().await;

    let response = app.get("/ws").await;

    assert!(response.status().is_client_error(), "got {}", response.status());
}
