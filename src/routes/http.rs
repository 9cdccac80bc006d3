// Handlers: version, sync status, manual reconcile, Prometheus scrape

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use super::AppState;
use crate::reconciler::ReconcileOutcome;
use crate::worker::SyncStatus;

/// Package name and version, from Cargo.toml at build time.
const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /version
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/sync/status
pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let status = match &state.service {
        Some(service) => service.status(),
        None => SyncStatus::disabled(&state.metrics),
    };
    axum::Json(status)
}

/// POST /api/sync/reconcile: 202 with the report, 409 when a pass is in flight,
/// 503 when sync is disabled.
pub(super) async fn reconcile_handler(State(state): State<AppState>) -> Response {
    let Some(service) = &state.service else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({ "error": "sync is disabled" })),
        )
            .into_response();
    };
    match service.reconcile_now().await {
        Ok(outcome @ ReconcileOutcome::Completed(_)) => {
            (StatusCode::ACCEPTED, axum::Json(outcome)).into_response()
        }
        Ok(outcome @ ReconcileOutcome::AlreadyRunning) => {
            (StatusCode::CONFLICT, axum::Json(outcome)).into_response()
        }
        Err(e) => {
            warn!(error = %e, operation = "reconcile", "manual reconciliation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({ "error": e.to_string(), "kind": e.kind() })),
            )
                .into_response()
        }
    }
}

/// GET /metrics
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}
