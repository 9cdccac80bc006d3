use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use volsync::metrics::{SyncMetrics, describe as describe_metrics};
use volsync::{config, docker_repo, routes, sync_repo, worker};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let sync_repo = sync_repo::SyncRepo::connect(
        &app_config.database.path,
        app_config.database.max_pool_size,
    )
    .await?;
    sync_repo.init().await?;
    let sync_repo = Arc::new(sync_repo);

    // Status and /metrics keep working without a recorder; only the scrape endpoint degrades.
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe_metrics();
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed");
            None
        }
    };
    let sync_metrics = Arc::new(SyncMetrics::new());

    let shutdown = CancellationToken::new();
    let service = if app_config.sync.enabled {
        let docker_repo = docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref())?;
        let service = worker::SyncService::spawn(
            worker::SyncDeps {
                source: Arc::new(docker_repo),
                repo: sync_repo.clone(),
                metrics: sync_metrics.clone(),
            },
            &app_config.sync,
            &shutdown,
        )
        .await?;
        Some(service)
    } else {
        tracing::info!("sync disabled (sync.enabled = false); serving status only");
        None
    };

    let app = routes::app(service.clone(), sync_metrics, prometheus);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal(in_container).await;
        tracing::info!("Received shutdown signal");
        signal_token.cancel();
    });

    // Stops accepting connections once the token fires, then lets in-flight requests finish.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    if let Some(service) = service {
        service.shutdown().await;
    }
    Ok(())
}

/// SIGTERM, or also Ctrl-C outside a container. In Docker only SIGTERM counts.
async fn shutdown_signal(in_container: bool) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler not installed");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        if in_container {
            sigterm.recv().await;
            return;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = in_container;
        let _ = tokio::signal::ctrl_c().await;
    }
}
