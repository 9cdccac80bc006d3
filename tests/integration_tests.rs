// Integration tests: HTTP status surface

mod common;

use axum_test::TestServer;
use common::{FakeDocker, temp_repo, wait_until};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use volsync::config::SyncConfig;
use volsync::metrics::SyncMetrics;
use volsync::routes;
use volsync::sync_repo::Repository;
use volsync::worker::{SyncDeps, SyncService};

fn disabled_server() -> TestServer {
    let app = routes::app(None, Arc::new(SyncMetrics::new()), None);
    TestServer::new(app)
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = disabled_server();
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("volsync: Docker volume sync");
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = disabled_server();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("volsync"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_status_when_sync_disabled() {
    let server = disabled_server();
    let response = server.get("/api/sync/status").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["enabled"], false);
    assert_eq!(json["connected"], false);
    assert!(json["last_event_time"].is_null());
    assert_eq!(json["metrics"]["processed_total"], 0);
}

#[tokio::test]
async fn test_reconcile_when_sync_disabled_is_unavailable() {
    let server = disabled_server();
    let response = server.post("/api/sync/reconcile").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_without_recorder_is_unavailable() {
    let server = disabled_server();
    let response = server.get("/metrics").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_and_manual_reconcile_with_sync_enabled() {
    let (_dir, repo) = temp_repo().await;
    let docker = FakeDocker::new();
    let metrics = Arc::new(SyncMetrics::new());
    let config = SyncConfig {
        enabled: true,
        reconcile_interval_secs: 0,
        ..SyncConfig::default()
    };
    let cancel = CancellationToken::new();
    let service = SyncService::spawn(
        SyncDeps {
            source: docker.clone(),
            repo: repo.clone(),
            metrics: metrics.clone(),
        },
        &config,
        &cancel,
    )
    .await
    .unwrap();
    assert!(wait_until(|| service.status().connected).await);
    // Let the startup pass finish so the manual one is not rejected as overlapping.
    assert!(
        wait_until(|| metrics.snapshot().reconcile_runs >= 1 && !service.status().reconciling)
            .await
    );

    let app = routes::app(Some(service.clone()), metrics.clone(), None);
    let server = TestServer::new(app);

    let status: serde_json::Value = server.get("/api/sync/status").await.json();
    assert_eq!(status["enabled"], true);
    assert_eq!(status["connected"], true);

    docker.add_volume("fresh");
    let response = server.post("/api/sync/reconcile").await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let report: serde_json::Value = response.json();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["created"], 1);
    assert!(repo.list_all_volumes().await.unwrap().iter().any(|v| v.volume_id == "fresh"));

    service.shutdown().await;
}
