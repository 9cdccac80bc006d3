// Background sync service: stream client, processing loop, reconcile loop, stats log.
// All tasks share one cancellation token; shutdown drains the inbox before returning.

use crate::config::SyncConfig;
use crate::docker_repo::EventSource;
use crate::error::SyncError;
use crate::events::{EventStreamClient, Inbox};
use crate::metrics::{MetricsSink, MetricsSnapshot, SyncMetrics};
use crate::processor::EventProcessor;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::sync_repo::Repository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Daemon client, store and metrics for the service.
pub struct SyncDeps {
    pub source: Arc<dyn EventSource>,
    pub repo: Arc<dyn Repository>,
    pub metrics: Arc<SyncMetrics>,
}

/// Sync state exposed on GET /api/sync/status.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub connected: bool,
    pub last_event_time: Option<DateTime<Utc>>,
    pub reconciling: bool,
    pub metrics: MetricsSnapshot,
}

impl SyncStatus {
    /// Status reported when sync is turned off in config.
    pub fn disabled(metrics: &SyncMetrics) -> Self {
        Self {
            enabled: false,
            connected: false,
            last_event_time: None,
            reconciling: false,
            metrics: metrics.snapshot(),
        }
    }
}

/// When periodic reconciliation fires.
enum ReconcileTrigger {
    Interval(Duration),
    Cron(Box<cron::Schedule>),
    Disabled,
}

impl ReconcileTrigger {
    fn from_config(config: &SyncConfig) -> Self {
        if let Some(expr) = &config.reconcile_schedule {
            match cron::Schedule::from_str(expr) {
                Ok(schedule) => return ReconcileTrigger::Cron(Box::new(schedule)),
                Err(e) => {
                    warn!(
                        cron = %expr,
                        error = %e,
                        "invalid reconcile_schedule; using reconcile_interval_secs"
                    )
                }
            }
        }
        match config.reconcile_interval() {
            Some(every) => ReconcileTrigger::Interval(every),
            None => ReconcileTrigger::Disabled,
        }
    }
}

pub struct SyncService {
    client: EventStreamClient,
    reconciler: Arc<Reconciler>,
    metrics: Arc<SyncMetrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncService {
    /// Starts the stream client and the background loops under a child of `parent`.
    pub async fn spawn(
        deps: SyncDeps,
        config: &SyncConfig,
        parent: &CancellationToken,
    ) -> Result<Arc<Self>, SyncError> {
        let SyncDeps {
            source,
            repo,
            metrics,
        } = deps;
        let sink: Arc<dyn MetricsSink> = metrics.clone();
        let cancel = parent.child_token();

        let inbox = Arc::new(Inbox::new(config.queue_size, config.overflow_policy));
        let client = EventStreamClient::new(
            source.clone(),
            inbox.clone(),
            sink.clone(),
            config.stream(),
        );
        let processor = Arc::new(EventProcessor::new(
            source.clone(),
            repo.clone(),
            sink.clone(),
            config.inspect_timeout(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            source,
            repo,
            sink.clone(),
            config.inspect_timeout(),
        ));

        client.start(&cancel).await?;
        let tasks = vec![
            tokio::spawn(process_loop(inbox, processor, sink)),
            tokio::spawn(reconcile_loop(
                reconciler.clone(),
                ReconcileTrigger::from_config(config),
                cancel.clone(),
            )),
            tokio::spawn(stats_loop(
                metrics.clone(),
                config.stats_log_interval(),
                cancel.clone(),
            )),
        ];
        info!(
            queue_size = config.queue_size,
            overflow_policy = ?config.overflow_policy,
            "sync service started"
        );

        Ok(Arc::new(Self {
            client,
            reconciler,
            metrics,
            cancel,
            tasks: Mutex::new(tasks),
        }))
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            enabled: true,
            connected: self.client.is_connected(),
            last_event_time: self.client.last_event_time(),
            reconciling: self.reconciler.is_running(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Runs a full reconciliation now unless one is already in flight.
    pub async fn reconcile_now(&self) -> Result<ReconcileOutcome, SyncError> {
        self.reconciler.full_reconcile().await
    }

    /// Cancels every task, lets the processing loop drain queued events, and waits.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Err(e) = self.client.stop().await {
            warn!(error = %e, "event stream stop failed");
        }
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "sync task ended abnormally");
            }
        }
        debug!("sync service stopped");
    }
}

/// Pops events in arrival order until the inbox is closed and empty.
async fn process_loop(
    inbox: Arc<Inbox>,
    processor: Arc<EventProcessor>,
    metrics: Arc<dyn MetricsSink>,
) {
    while let Some(event) = inbox.pop().await {
        metrics.queue_size(inbox.len());
        match processor.process_event(&event).await {
            Ok(()) => metrics.event_processed(&event.event_type, &event.action),
            Err(e) => {
                metrics.event_failed(&event.event_type, e.kind());
                warn!(
                    error = %e,
                    event_type = %event.event_type,
                    id = %event.id,
                    "event processing failed"
                );
            }
        }
    }
    debug!("processing loop drained");
}

/// Startup pass, then one pass per trigger. An in-flight pass is dropped on cancellation.
async fn reconcile_loop(
    reconciler: Arc<Reconciler>,
    trigger: ReconcileTrigger,
    cancel: CancellationToken,
) {
    if !run_pass(&reconciler, &cancel).await {
        return;
    }
    match trigger {
        ReconcileTrigger::Disabled => {
            debug!("periodic reconciliation disabled");
        }
        ReconcileTrigger::Interval(every) => {
            let Some(first) = Instant::now().checked_add(every) else {
                warn!(
                    interval = ?every,
                    "reconcile interval out of range; periodic reconciliation disabled"
                );
                return;
            };
            let mut tick = interval_at(first, every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if !run_pass(&reconciler, &cancel).await {
                            break;
                        }
                    }
                }
            }
        }
        ReconcileTrigger::Cron(schedule) => loop {
            let now = chrono::Local::now();
            let delay = match schedule.after(&now).next() {
                Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
                None => Duration::from_secs(3600),
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    if !run_pass(&reconciler, &cancel).await {
                        break;
                    }
                }
            }
        },
    }
}

/// Returns false when cancelled mid-pass.
async fn run_pass(reconciler: &Reconciler, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("reconciliation abandoned on shutdown");
            false
        }
        result = reconciler.full_reconcile() => {
            match result {
                Ok(ReconcileOutcome::Completed(_)) => {}
                Ok(ReconcileOutcome::AlreadyRunning) => {
                    debug!("reconciliation already running; skipping scheduled pass")
                }
                // Already logged per kind by the reconciler.
                Err(e) => debug!(error = %e, "scheduled reconciliation failed"),
            }
            true
        }
    }
}

async fn stats_loop(metrics: Arc<SyncMetrics>, every: Duration, cancel: CancellationToken) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let s = metrics.snapshot();
                info!(
                    connected = s.connected,
                    queue_size = s.queue_size,
                    processed_total = s.processed_total,
                    errors_total = s.errors_total,
                    dropped_total = s.dropped_total,
                    reconnects_total = s.reconnects_total,
                    reconcile_runs = s.reconcile_runs,
                    reconcile_failures = s.reconcile_failures,
                    "sync stats"
                );
            }
        }
    }
}
