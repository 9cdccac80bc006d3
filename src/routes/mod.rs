// HTTP status surface

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::metrics::SyncMetrics;
use crate::worker::SyncService;

#[derive(Clone)]
pub(crate) struct AppState {
    /// `None` when sync is disabled in config.
    pub(crate) service: Option<Arc<SyncService>>,
    pub(crate) metrics: Arc<SyncMetrics>,
    pub(crate) prometheus: Option<PrometheusHandle>,
}

pub fn app(
    service: Option<Arc<SyncService>>,
    metrics: Arc<SyncMetrics>,
    prometheus: Option<PrometheusHandle>,
) -> Router {
    let state = AppState {
        service,
        metrics,
        prometheus,
    };
    Router::new()
        .route("/", get(|| async { "volsync: Docker volume sync" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/sync/status", get(http::status_handler)) // GET /api/sync/status
        .route("/api/sync/reconcile", post(http::reconcile_handler)) // POST /api/sync/reconcile
        .route("/metrics", get(http::metrics_handler)) // GET /metrics
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
