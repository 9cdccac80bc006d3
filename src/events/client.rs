// Owns the daemon event subscription: connect, normalize, enqueue, reconnect with backoff.

use super::backoff::Backoff;
use super::inbox::{Inbox, Pushed};
use crate::docker_repo::{EventFilter, EventSource, Subscription};
use crate::error::SyncError;
use crate::metrics::MetricsSink;
use crate::models::{DockerEvent, RawEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sentinel for "no event received yet".
const NO_EVENT: i64 = i64::MIN;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    pub backoff_jitter: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_jitter: 0.2,
        }
    }
}

struct Shared {
    source: Arc<dyn EventSource>,
    inbox: Arc<Inbox>,
    metrics: Arc<dyn MetricsSink>,
    config: StreamConfig,
    connected: AtomicBool,
    last_event_ms: AtomicI64,
    sessions: AtomicU64,
}

enum SessionEnd {
    Cancelled,
    Failed(anyhow::Error),
    Closed,
}

pub struct EventStreamClient {
    shared: Arc<Shared>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl EventStreamClient {
    pub fn new(
        source: Arc<dyn EventSource>,
        inbox: Arc<Inbox>,
        metrics: Arc<dyn MetricsSink>,
        config: StreamConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                inbox,
                metrics,
                config,
                connected: AtomicBool::new(false),
                last_event_ms: AtomicI64::new(NO_EVENT),
                sessions: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawns the receive loop. It runs until `stop` or until `parent` is cancelled.
    pub async fn start(&self, parent: &CancellationToken) -> Result<(), SyncError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(SyncError::AlreadyStarted);
        }
        let cancel = parent.child_token();
        let shared = self.shared.clone();
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            shared.run(loop_cancel).await;
        });
        *task = Some((cancel, handle));
        Ok(())
    }

    /// Stops the receive loop and closes the inbox. Safe to call more than once.
    pub async fn stop(&self) -> Result<(), SyncError> {
        let Some((cancel, handle)) = self.task.lock().await.take() else {
            self.shared.inbox.close();
            return Ok(());
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "event stream task ended abnormally");
        }
        self.shared.inbox.close();
        Ok(())
    }

    /// Waits for the receive loop to exit on its own (parent cancellation).
    pub async fn join(&self) {
        let handle = self.task.lock().await.take().map(|(_, h)| h);
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "event stream task ended abnormally");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn last_event_time(&self) -> Option<DateTime<Utc>> {
        match self.shared.last_event_ms.load(Ordering::SeqCst) {
            NO_EVENT => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn inbox(&self) -> &Arc<Inbox> {
        &self.shared.inbox
    }
}

impl Shared {
    async fn run(&self, cancel: CancellationToken) {
        let mut backoff = Backoff::new(
            self.config.backoff_min,
            self.config.backoff_max,
            self.config.backoff_jitter,
        );
        let filter = EventFilter::tracked();

        while !cancel.is_cancelled() {
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.source.subscribe(&filter) => r,
            };
            match subscribed {
                Ok(subscription) => {
                    self.on_connected();
                    backoff.reset();
                    let end = self.pump(subscription, &cancel).await;
                    self.set_connected(false);
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Failed(e) => {
                            let e = SyncError::Connection(e);
                            warn!(error = %e, "event stream failed; reconnecting");
                        }
                        SessionEnd::Closed => warn!("event stream closed; reconnecting"),
                    }
                }
                Err(e) => {
                    let e = SyncError::Connection(e);
                    warn!(error = %e, "event stream subscribe failed");
                }
            }

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_connected(false);
        self.inbox.close();
        debug!("event stream loop stopped");
    }

    fn on_connected(&self) {
        let previous = self.sessions.fetch_add(1, Ordering::SeqCst);
        if previous > 0 {
            self.metrics.reconnected();
            info!(sessions = previous + 1, "event stream reconnected");
        } else {
            info!("event stream connected");
        }
        self.set_connected(true);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.metrics.connection_status(connected);
    }

    async fn pump(&self, mut subscription: Subscription, cancel: &CancellationToken) -> SessionEnd {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                item = subscription.recv() => match item {
                    Some(Ok(raw)) => self.accept(raw),
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    fn accept(&self, raw: RawEvent) {
        let now = Utc::now();
        let kind = raw.kind.clone();
        let action = raw.action.clone();
        let Some(event) = DockerEvent::from_raw(raw, now) else {
            debug!(kind = %kind, action = %action, "ignoring untracked event");
            return;
        };
        self.last_event_ms
            .store(event.time.timestamp_millis(), Ordering::SeqCst);
        self.metrics.last_event(event.time);

        match self.inbox.push(event) {
            Pushed::Queued => {}
            Pushed::Dropped(dropped) => {
                self.metrics.event_dropped();
                warn!(
                    error = %SyncError::QueueOverflow,
                    event_type = %dropped.event_type,
                    id = %dropped.id,
                    policy = ?self.inbox.policy(),
                    "event dropped"
                );
            }
            Pushed::Closed(dropped) => {
                debug!(event_type = %dropped.event_type, id = %dropped.id, "inbox closed; event discarded");
            }
        }
        self.metrics.queue_size(self.inbox.len());
    }
}
