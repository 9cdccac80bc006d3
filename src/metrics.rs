//! Sync metrics.
//!
//! The core reports through the [`MetricsSink`] trait. [`SyncMetrics`] keeps the
//! totals behind the status endpoint and forwards every call to the `metrics`
//! facade, so whichever recorder `main` installs (Prometheus) sees them too.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::models::EventType;

pub const EVENTS_PROCESSED_TOTAL: &str = "volsync_events_processed_total";
pub const EVENTS_FAILED_TOTAL: &str = "volsync_events_failed_total";
pub const EVENTS_DROPPED_TOTAL: &str = "volsync_events_dropped_total";
pub const QUEUE_SIZE: &str = "volsync_queue_size";
pub const CONNECTED: &str = "volsync_connected";
pub const RECONNECTS_TOTAL: &str = "volsync_reconnects_total";
pub const LAST_EVENT_TIMESTAMP: &str = "volsync_last_event_timestamp_seconds";
pub const RECONCILE_RUNS_TOTAL: &str = "volsync_reconcile_runs_total";
pub const RECONCILE_FAILURES_TOTAL: &str = "volsync_reconcile_failures_total";
pub const RECONCILE_DURATION_SECONDS: &str = "volsync_reconcile_duration_seconds";
pub const RESOURCES_SYNCED_TOTAL: &str = "volsync_resources_synced_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Volume,
    Container,
    Mount,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Volume => "volume",
            Resource::Container => "container",
            Resource::Mount => "mount",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Create,
    Update,
    Delete,
}

impl Change {
    pub fn as_str(&self) -> &'static str {
        match self {
            Change::Create => "create",
            Change::Update => "update",
            Change::Delete => "delete",
        }
    }
}

/// Where a repository mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    Event,
    Reconciliation,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::Event => "event",
            SyncSource::Reconciliation => "reconciliation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    Volumes,
    Containers,
    Full,
}

impl ReconcileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileKind::Volumes => "volumes",
            ReconcileKind::Containers => "containers",
            ReconcileKind::Full => "full",
        }
    }
}

/// Calls the sync core makes on every meaningful transition.
pub trait MetricsSink: Send + Sync {
    fn event_processed(&self, event_type: &EventType, action: &str);
    fn event_failed(&self, event_type: &EventType, error_kind: &'static str);
    fn event_dropped(&self);
    fn queue_size(&self, size: usize);
    fn connection_status(&self, connected: bool);
    fn reconnected(&self);
    fn last_event(&self, at: DateTime<Utc>);
    /// One pass of `kind`, nested or not. Feeds the per-kind Prometheus series.
    fn reconcile_run(&self, kind: ReconcileKind, duration: Duration, failed: bool);
    /// One requested pass (startup, scheduled, manual) finished. Feeds the status snapshot.
    fn reconcile_finished(&self, failed: bool);
    fn resource_synced(&self, resource: Resource, change: Change, source: SyncSource);
}

/// Totals exposed on the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub processed_total: u64,
    pub errors_total: u64,
    pub dropped_total: u64,
    pub reconnects_total: u64,
    pub reconcile_runs: u64,
    pub reconcile_failures: u64,
    pub queue_size: u64,
    pub connected: bool,
}

#[derive(Debug, Default)]
pub struct SyncMetrics {
    processed_total: AtomicU64,
    errors_total: AtomicU64,
    dropped_total: AtomicU64,
    reconnects_total: AtomicU64,
    reconcile_runs: AtomicU64,
    reconcile_failures: AtomicU64,
    queue_size: AtomicU64,
    connected: AtomicBool,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_total: self.processed_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
            reconnects_total: self.reconnects_total.load(Ordering::Relaxed),
            reconcile_runs: self.reconcile_runs.load(Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.load(Ordering::Relaxed),
            queue_size: self.queue_size.load(Ordering::Relaxed),
            connected: self.connected.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for SyncMetrics {
    fn event_processed(&self, event_type: &EventType, action: &str) {
        self.processed_total.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_PROCESSED_TOTAL, "type" => event_type.label(), "action" => action.to_string())
            .increment(1);
    }

    fn event_failed(&self, event_type: &EventType, error_kind: &'static str) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_FAILED_TOTAL, "type" => event_type.label(), "error" => error_kind)
            .increment(1);
    }

    fn event_dropped(&self) {
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        counter!(EVENTS_DROPPED_TOTAL).increment(1);
    }

    fn queue_size(&self, size: usize) {
        self.queue_size.store(size as u64, Ordering::Relaxed);
        gauge!(QUEUE_SIZE).set(size as f64);
    }

    fn connection_status(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
    }

    fn reconnected(&self) {
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
        counter!(RECONNECTS_TOTAL).increment(1);
    }

    fn last_event(&self, at: DateTime<Utc>) {
        gauge!(LAST_EVENT_TIMESTAMP).set(at.timestamp_millis() as f64 / 1000.0);
    }

    fn reconcile_run(&self, kind: ReconcileKind, duration: Duration, failed: bool) {
        counter!(RECONCILE_RUNS_TOTAL, "kind" => kind.as_str()).increment(1);
        histogram!(RECONCILE_DURATION_SECONDS, "kind" => kind.as_str())
            .record(duration.as_secs_f64());
        if failed {
            counter!(RECONCILE_FAILURES_TOTAL, "kind" => kind.as_str()).increment(1);
        }
    }

    fn reconcile_finished(&self, failed: bool) {
        self.reconcile_runs.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.reconcile_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn resource_synced(&self, resource: Resource, change: Change, source: SyncSource) {
        counter!(
            RESOURCES_SYNCED_TOTAL,
            "resource" => resource.as_str(),
            "change" => change.as_str(),
            "source" => source.as_str()
        )
        .increment(1);
    }
}

/// Registers metric descriptions with the installed recorder. Call once at startup.
pub fn describe() {
    describe_counter!(EVENTS_PROCESSED_TOTAL, "Daemon events applied, by type and action");
    describe_counter!(EVENTS_FAILED_TOTAL, "Daemon events that failed, by type and error kind");
    describe_counter!(EVENTS_DROPPED_TOTAL, "Events dropped because the inbox was full");
    describe_gauge!(QUEUE_SIZE, "Events waiting in the inbox");
    describe_gauge!(CONNECTED, "1 when the event stream is connected");
    describe_counter!(RECONNECTS_TOTAL, "Successful event stream reconnects");
    describe_gauge!(LAST_EVENT_TIMESTAMP, "Unix time of the last received event");
    describe_counter!(RECONCILE_RUNS_TOTAL, "Reconciliation passes, by kind");
    describe_counter!(RECONCILE_FAILURES_TOTAL, "Failed reconciliation passes, by kind");
    describe_histogram!(RECONCILE_DURATION_SECONDS, "Reconciliation pass duration");
    describe_counter!(
        RESOURCES_SYNCED_TOTAL,
        "Repository mutations by resource, change and source"
    );
}
