//! Integration tests for the warden API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use warden::api::{create_router, AppState};
use warden_lib::{
    audit::AuditConfig,
    health::components,
    models::{IncidentType, Severity},
    observability::WardenMetrics,
    orchestrator::{Orchestrator, WardenConfig},
};

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _dir: TempDir,
}

/// Pipeline that is assembled but never started, so nothing is probed or spawned
fn setup_test_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = WardenConfig {
        target_url: "http://127.0.0.1:3999".to_string(),
        audit: AuditConfig::new(dir.path().join("data")),
        ..Default::default()
    };

    let orchestrator = Orchestrator::from_config(config).unwrap();
    let state = Arc::new(AppState::new(orchestrator));
    let router = create_router(state.clone());

    TestApp {
        router,
        state,
        _dir: dir,
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_reports_pipeline_components() {
    let app = setup_test_app();
    app.state.health_registry.register_all().await;

    let (status, health) = get(app.router, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["monitor"].is_object());
    assert!(health["components"]["audit_store"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_audit_store_degraded() {
    let app = setup_test_app();
    app.state.health_registry.register_all().await;
    app.state
        .health_registry
        .set_degraded(components::AUDIT_STORE, "write_history failed: disk full")
        .await;

    let (status, health) = get(app.router, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let app = setup_test_app();
    app.state
        .health_registry
        .set_unhealthy(components::ORCHESTRATOR, "fatal error")
        .await;

    let (status, health) = get(app.router, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_pipeline_state() {
    let app = setup_test_app();

    let (status, readiness) = get(app.router.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, readiness) = get(app.router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_status_is_down_before_first_probe() {
    let app = setup_test_app();

    let (status, body) = get(app.router, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["activeIncidents"], 0);
    assert_eq!(body["monitoring"], false);
}

#[tokio::test]
async fn test_latest_report_is_404_until_generated() {
    let app = setup_test_app();

    let (status, _) = get(app.router.clone(), "/reports/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.state.orchestrator.generate_report().await;

    let (status, report) = get(app.router, "/reports/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["systemStatus"], "DOWN");
    assert_eq!(report["serverHealth"]["port"], 3999);
    assert!(report["recommendations"].is_array());
}

#[tokio::test]
async fn test_reports_limit() {
    let app = setup_test_app();
    for _ in 0..12 {
        app.state.orchestrator.generate_report().await;
    }

    let (_, all) = get(app.router.clone(), "/reports").await;
    assert_eq!(all.as_array().unwrap().len(), 10);

    let (_, two) = get(app.router, "/reports?limit=2").await;
    assert_eq!(two.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_detailed_report_includes_incidents_and_history() {
    let app = setup_test_app();
    let orchestrator = &app.state.orchestrator;
    let incident = orchestrator
        .monitor()
        .report_incident(IncidentType::BuildError, Severity::High, "Build failed: SyntaxError")
        .unwrap();
    orchestrator.audit().record_incident(&incident).await;

    let (status, detailed) = get(app.router, "/report/detailed").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(detailed["activeIncidents"][0]["type"], "BUILD_ERROR");
    assert_eq!(detailed["history"][0]["resolution"], "PENDING");
    assert_eq!(detailed["metrics"]["incidentsByType"]["BUILD_ERROR"], 1);
    assert!(detailed["fixes"].as_array().unwrap().is_empty());
    assert!(detailed["latestReport"].is_null());
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app();

    let metrics = WardenMetrics::new();
    metrics.observe_probe_latency(0.02);
    metrics.inc_incidents_raised("SERVER_DOWN");
    metrics.inc_fixes("RESTART_SERVER", true);

    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("warden_probe_latency_seconds_bucket"));
    assert!(metrics_text.contains("warden_incidents_raised_total"));
    assert!(metrics_text.contains("warden_fixes_total"));
    assert!(metrics_text.contains("warden_system_status"));
}
